use serde::{Deserialize, Serialize};
use std::fmt;

/// Control flags used by the connection lifecycle layer.
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
}

/// Which role a segment is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn peer(&self) -> Self {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }
}

/// Alternating bit (stop-and-wait) or sequence/ACK number (sliding window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeqTag {
    Bit(bool),
    Num(u64),
}

impl SeqTag {
    pub fn as_bit(&self) -> Option<bool> {
        match self {
            SeqTag::Bit(bit) => Some(*bit),
            SeqTag::Num(_) => None,
        }
    }

    pub fn as_num(&self) -> Option<u64> {
        match self {
            SeqTag::Num(n) => Some(*n),
            SeqTag::Bit(_) => None,
        }
    }
}

impl fmt::Display for SeqTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeqTag::Bit(bit) => write!(f, "bit={}", u8::from(*bit)),
            SeqTag::Num(n) => write!(f, "seq={n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Application message.
    Data(Vec<u8>),
    Ack,
    /// Bare SYN/FIN without data.
    Control,
    /// Sentinel written by the channel in place of a garbled payload.
    /// Protocol roles never construct this themselves.
    Corrupted,
}

/// The unit exchanged on the channel.
///
/// Once handed to [`crate::SystemContext::send_to_network`] a segment is
/// owned by the channel. Senders that need to retransmit keep their own
/// clone and send a fresh copy of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub payload: Payload,
    pub destination: Role,
    pub sequence_tag: Option<SeqTag>,
    pub flags: u8,
}

impl Segment {
    pub fn new(
        payload: Payload,
        destination: Role,
        sequence_tag: Option<SeqTag>,
        flags: u8,
    ) -> Self {
        Self {
            payload,
            destination,
            sequence_tag,
            flags,
        }
    }

    /// Data segment addressed to the receiver.
    pub fn data(message: Vec<u8>, tag: Option<SeqTag>) -> Self {
        Self::new(Payload::Data(message), Role::Receiver, tag, 0)
    }

    /// Acknowledgment addressed to the sender.
    pub fn ack(tag: SeqTag) -> Self {
        Self::ack_to(Role::Sender, tag)
    }

    /// Acknowledgment travelling the other way, e.g. a handshake confirmation.
    pub fn ack_to(destination: Role, tag: SeqTag) -> Self {
        Self::new(Payload::Ack, destination, Some(tag), 0)
    }

    /// Bare SYN or FIN carrying only a sequence number.
    pub fn control(destination: Role, seq: u64, flags: u8) -> Self {
        Self::new(Payload::Control, destination, Some(SeqTag::Num(seq)), flags)
    }

    /// What the channel hands over after garbling a segment: nothing but
    /// the destination survives.
    pub fn corrupted(destination: Role) -> Self {
        Self::new(Payload::Corrupted, destination, None, 0)
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self.payload, Payload::Corrupted)
    }

    pub fn is_ack(&self) -> bool {
        matches!(self.payload, Payload::Ack)
    }

    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    pub fn bit(&self) -> Option<bool> {
        self.sequence_tag.and_then(|t| t.as_bit())
    }

    pub fn seq(&self) -> Option<u64> {
        self.sequence_tag.and_then(|t| t.as_num())
    }

    /// Application bytes, if this is a data segment.
    pub fn message(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Data(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.message().map_or(0, <[u8]>::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.payload {
            Payload::Data(bytes) => format!("DATA({} bytes)", bytes.len()),
            Payload::Ack => "ACK".to_string(),
            Payload::Control => "CTRL".to_string(),
            Payload::Corrupted => "<CORRUPTED>".to_string(),
        };
        write!(f, "{kind}")?;
        if self.is_syn() {
            write!(f, "+SYN")?;
        }
        if self.is_fin() {
            write!(f, "+FIN")?;
        }
        if let Some(tag) = self.sequence_tag {
            write!(f, " {tag}")?;
        }
        Ok(())
    }
}
