//! Stop-and-wait with a single alternating bit.
//!
//! The sender has at most one segment outstanding. The receiver delivers a
//! segment only when its bit matches the one it expects, and always answers
//! with an ACK carrying the bit of the last segment it accepted.

use rdt_lab_abstract::{
    AdmissionError, CorruptAckPolicy, ProtocolConfig, ReceiverProtocol, SeqTag, Segment,
    SenderProtocol, SystemContext,
};

#[derive(Debug)]
enum SenderState {
    Idle,
    /// `last_sent` is the retained copy re-sent verbatim on timeout.
    AwaitingAck { last_sent: Segment },
}

#[derive(Debug)]
pub struct AltBitSender {
    bit: bool,
    state: SenderState,
    retransmit_interval: u64,
    corrupt_ack_policy: CorruptAckPolicy,
}

impl AltBitSender {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            bit: true,
            state: SenderState::Idle,
            retransmit_interval: config.retransmit_interval,
            corrupt_ack_policy: config
                .corrupt_ack_policy
                .unwrap_or(CorruptAckPolicy::RetransmitImmediately),
        }
    }

    /// Bit that the next (or outstanding) segment carries.
    pub fn current_bit(&self) -> bool {
        self.bit
    }

    pub fn is_awaiting_ack(&self) -> bool {
        matches!(self.state, SenderState::AwaitingAck { .. })
    }

    fn retransmit(&self, ctx: &mut dyn SystemContext) {
        if let SenderState::AwaitingAck { last_sent } = &self.state {
            ctx.log(&format!("ABP resending {last_sent}"));
            ctx.send_to_network(last_sent.clone());
            ctx.start_timer(self.retransmit_interval);
        }
    }
}

impl SenderProtocol for AltBitSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        ctx.log("ABP sender ready");
        ctx.allow_app_msgs();
    }

    fn receive_from_app(
        &mut self,
        ctx: &mut dyn SystemContext,
        message: &[u8],
    ) -> Result<(), AdmissionError> {
        if self.is_awaiting_ack() {
            return Err(AdmissionError::AwaitingAck);
        }

        let segment = Segment::data(message.to_vec(), Some(SeqTag::Bit(self.bit)));
        ctx.log(&format!("ABP send {segment}"));
        ctx.send_to_network(segment.clone());
        ctx.start_timer(self.retransmit_interval);
        ctx.disallow_app_msgs();
        self.state = SenderState::AwaitingAck { last_sent: segment };
        Ok(())
    }

    fn receive_from_network(&mut self, ctx: &mut dyn SystemContext, segment: Segment) {
        if segment.is_corrupted() {
            match self.corrupt_ack_policy {
                CorruptAckPolicy::RetransmitImmediately if self.is_awaiting_ack() => {
                    ctx.log("ABP corrupted ACK, retransmitting now");
                    self.retransmit(ctx);
                }
                _ => ctx.log("ABP corrupted ACK ignored"),
            }
            return;
        }

        let acked = match (segment.is_ack(), segment.bit()) {
            (true, Some(bit)) => bit,
            _ => {
                ctx.log(&format!("ABP sender ignoring {segment}"));
                return;
            }
        };

        if !self.is_awaiting_ack() || acked != self.bit {
            ctx.log(&format!(
                "ABP stale ACK bit={} (current bit={})",
                u8::from(acked),
                u8::from(self.bit)
            ));
            return;
        }

        ctx.log(&format!("ABP received ACK bit={}", u8::from(acked)));
        ctx.end_timer();
        self.bit = !self.bit;
        self.state = SenderState::Idle;
        ctx.allow_app_msgs();
    }

    fn on_interrupt(&mut self, ctx: &mut dyn SystemContext) {
        if !self.is_awaiting_ack() {
            ctx.log("ABP timer fired while idle, nothing to resend");
            return;
        }
        ctx.log("ABP timeout");
        self.retransmit(ctx);
    }

    fn is_finished(&self) -> bool {
        !self.is_awaiting_ack()
    }
}

#[derive(Debug)]
pub struct AltBitReceiver {
    expected_bit: bool,
}

impl Default for AltBitReceiver {
    fn default() -> Self {
        Self { expected_bit: true }
    }
}

impl AltBitReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_bit(&self) -> bool {
        self.expected_bit
    }

    /// ACK for the bit of the last accepted segment: the complement of what
    /// we expect next.
    fn reack_previous(&self, ctx: &mut dyn SystemContext) {
        ctx.send_to_network(Segment::ack(SeqTag::Bit(!self.expected_bit)));
    }
}

impl ReceiverProtocol for AltBitReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        ctx.log("ABP receiver ready");
    }

    fn receive_from_client(&mut self, ctx: &mut dyn SystemContext, segment: Segment) {
        if segment.is_corrupted() {
            ctx.log(&format!(
                "ABP corrupted segment, re-ACK bit={}",
                u8::from(!self.expected_bit)
            ));
            self.reack_previous(ctx);
            return;
        }

        let (message, bit) = match (segment.message(), segment.bit()) {
            (Some(message), Some(bit)) => (message, bit),
            _ => {
                ctx.log(&format!("ABP receiver ignoring {segment}"));
                return;
            }
        };

        if bit == self.expected_bit {
            ctx.log(&format!(
                "ABP received bit={} ({} bytes)",
                u8::from(bit),
                message.len()
            ));
            ctx.send_to_app(message);
            ctx.send_to_network(Segment::ack(SeqTag::Bit(bit)));
            self.expected_bit = !self.expected_bit;
        } else {
            ctx.log(&format!(
                "ABP duplicate bit={} (expect {}), re-ACK",
                u8::from(bit),
                u8::from(self.expected_bit)
            ));
            self.reack_previous(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingContext;
    use rdt_lab_abstract::Role;

    fn sender() -> AltBitSender {
        AltBitSender::new(&ProtocolConfig::default())
    }

    #[test]
    fn clean_round_flips_bit_and_cancels_timer() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender();
        let mut rx = AltBitReceiver::new();

        tx.receive_from_app(&mut ctx, b"A").unwrap();
        assert_eq!(ctx.timer, Some(ProtocolConfig::default().retransmit_interval));
        assert!(!ctx.gate_open());

        let data = ctx.take_sent().remove(0);
        assert_eq!(data.bit(), Some(true));
        rx.receive_from_client(&mut ctx, data);
        assert_eq!(ctx.delivered, vec![b"A".to_vec()]);

        let ack = ctx.take_sent().remove(0);
        assert_eq!(ack.bit(), Some(true));
        tx.receive_from_network(&mut ctx, ack);

        assert!(!tx.current_bit());
        assert!(!tx.is_awaiting_ack());
        assert_eq!(ctx.timer, None);
        assert!(ctx.gate_open());
        assert!(!rx.expected_bit());
    }

    #[test]
    fn second_message_rejected_while_outstanding() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender();
        tx.receive_from_app(&mut ctx, b"A").unwrap();

        let err = tx.receive_from_app(&mut ctx, b"B").unwrap_err();
        assert_eq!(err, AdmissionError::AwaitingAck);
        assert_eq!(ctx.sent.len(), 1);
    }

    #[test]
    fn corrupted_ack_then_timeout_resends_identical_segment() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender();
        let mut rx = AltBitReceiver::new();

        tx.receive_from_app(&mut ctx, b"A").unwrap();
        let original = ctx.take_sent().remove(0);
        rx.receive_from_client(&mut ctx, original.clone());
        ctx.take_sent(); // the ACK is garbled on the way back

        // Timer fires: the retained copy goes out unmodified.
        tx.on_interrupt(&mut ctx);
        let resent = ctx.take_sent().remove(0);
        assert_eq!(resent, original);
        assert_eq!(ctx.timer_starts, 2);

        // Receiver already expects bit=false: duplicate, re-ACK bit=true, no delivery.
        rx.receive_from_client(&mut ctx, resent);
        assert_eq!(ctx.delivered.len(), 1);
        let reack = ctx.take_sent().remove(0);
        assert_eq!(reack.bit(), Some(true));

        tx.receive_from_network(&mut ctx, reack);
        assert!(!tx.is_awaiting_ack());
        assert!(!tx.current_bit());
    }

    #[test]
    fn corrupted_ack_retransmits_immediately_by_default() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender();
        tx.receive_from_app(&mut ctx, b"A").unwrap();
        let original = ctx.take_sent().remove(0);

        tx.receive_from_network(&mut ctx, Segment::corrupted(Role::Sender));
        assert_eq!(ctx.take_sent(), vec![original]);
        assert_eq!(ctx.timer_starts, 2);
        assert!(tx.is_awaiting_ack());
    }

    #[test]
    fn corrupted_ack_waits_for_timer_when_configured() {
        let mut ctx = RecordingContext::default();
        let config =
            ProtocolConfig::default().with_corrupt_ack_policy(CorruptAckPolicy::AwaitTimeout);
        let mut tx = AltBitSender::new(&config);
        tx.receive_from_app(&mut ctx, b"A").unwrap();
        ctx.take_sent();

        tx.receive_from_network(&mut ctx, Segment::corrupted(Role::Sender));
        assert!(ctx.sent.is_empty());
        assert_eq!(ctx.timer_starts, 1);
    }

    #[test]
    fn stale_ack_leaves_sender_waiting() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender();
        tx.receive_from_app(&mut ctx, b"A").unwrap();

        tx.receive_from_network(&mut ctx, Segment::ack(SeqTag::Bit(false)));
        assert!(tx.is_awaiting_ack());
        assert!(tx.current_bit());
        assert_eq!(ctx.timer_cancels, 0);
    }

    #[test]
    fn timer_while_idle_is_a_no_op() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender();
        tx.on_interrupt(&mut ctx);
        assert!(ctx.sent.is_empty());
        assert_eq!(ctx.timer_starts, 0);
    }

    #[test]
    fn receiver_answers_corruption_with_complement() {
        let mut ctx = RecordingContext::default();
        let mut rx = AltBitReceiver::new();
        rx.receive_from_client(&mut ctx, Segment::corrupted(Role::Receiver));

        let ack = ctx.take_sent().remove(0);
        assert!(ack.is_ack());
        assert_eq!(ack.bit(), Some(false));
        assert!(ctx.delivered.is_empty());
        assert!(rx.expected_bit());
    }
}
