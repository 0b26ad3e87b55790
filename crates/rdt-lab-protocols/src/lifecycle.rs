//! Connection set-up and tear-down around the Go-Back-N pair.
//!
//! ```text
//! sender                               receiver
//!   │ ── SYN(x) ──────────────────────▶ │  Listen -> SynReceived
//!   │ ◀────────────────── ACK+SYN(y) ── │
//!   │ ── ACK(y) ──────────────────────▶ │  -> Established
//!   │ ── DATA(x+1), DATA(x+2) ... ────▶ │
//!   │ ── FIN(k) ──────────────────────▶ │  -> Closed
//!   │ ◀────────────────── ACK+FIN(k) ── │
//! ```
//!
//! The SYN consumes sequence number `x`, so data starts at `x + 1` and the
//! receiver always has a cumulative point to re-assert.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rdt_lab_abstract::{
    AdmissionError, CorruptAckPolicy, ProtocolConfig, ReceiverProtocol, Role, SeqTag, Segment,
    SenderProtocol, SystemContext, flags,
};

use crate::gbn::{GbnReceiver, GbnSender};

/// Initial sequence numbers are drawn from `0..=MAX_ISN`.
const MAX_ISN: u64 = u32::MAX as u64;

fn isn_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

#[derive(Debug)]
enum SenderPhase {
    /// Before `init`.
    Closed,
    SynSent { isn: u64 },
    Established {
        peer_isn: u64,
        data: GbnSender,
        close_requested: bool,
    },
    FinWait { fin: Segment },
    Done,
}

#[derive(Debug)]
pub struct ConnectedSender {
    config: ProtocolConfig,
    rng: StdRng,
    phase: SenderPhase,
}

impl ConnectedSender {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            config: config.clone(),
            rng: isn_rng(config.isn_seed),
            phase: SenderPhase::Closed,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase, SenderPhase::Established { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, SenderPhase::Done)
    }

    /// The data-transfer state once the handshake has completed.
    pub fn data(&self) -> Option<&GbnSender> {
        match &self.phase {
            SenderPhase::Established { data, .. } => Some(data),
            _ => None,
        }
    }

    fn corrupt_ack_policy(&self) -> CorruptAckPolicy {
        self.config
            .corrupt_ack_policy
            .unwrap_or(CorruptAckPolicy::AwaitTimeout)
    }

    fn send_syn(&self, ctx: &mut dyn SystemContext, isn: u64) {
        ctx.send_to_network(Segment::control(Role::Receiver, isn, flags::SYN));
        ctx.start_timer(self.config.retransmit_interval);
    }

    fn send_fin(&mut self, ctx: &mut dyn SystemContext, fin_seq: u64) {
        let fin = Segment::control(Role::Receiver, fin_seq, flags::FIN);
        ctx.log(&format!("sending {fin}"));
        ctx.send_to_network(fin.clone());
        ctx.start_timer(self.config.retransmit_interval);
        self.phase = SenderPhase::FinWait { fin };
    }

    /// Resend whatever control segment the current phase is waiting on.
    fn resend_control(&self, ctx: &mut dyn SystemContext) {
        match &self.phase {
            SenderPhase::SynSent { isn } => self.send_syn(ctx, *isn),
            SenderPhase::FinWait { fin } => {
                ctx.send_to_network(fin.clone());
                ctx.start_timer(self.config.retransmit_interval);
            }
            _ => {}
        }
    }

    /// Send FIN once a pending close has nothing left in flight.
    fn maybe_finish(&mut self, ctx: &mut dyn SystemContext) {
        let fin_seq = match &self.phase {
            SenderPhase::Established {
                data,
                close_requested: true,
                ..
            } if data.is_idle() => data.next_sequence(),
            _ => return,
        };
        self.send_fin(ctx, fin_seq);
    }
}

impl SenderProtocol for ConnectedSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        ctx.disallow_app_msgs();
        let isn = self.rng.random_range(0..=MAX_ISN);
        ctx.log(&format!("connecting, SYN isn={isn}"));
        self.send_syn(ctx, isn);
        self.phase = SenderPhase::SynSent { isn };
    }

    fn receive_from_app(
        &mut self,
        ctx: &mut dyn SystemContext,
        message: &[u8],
    ) -> Result<(), AdmissionError> {
        match &mut self.phase {
            SenderPhase::Closed | SenderPhase::SynSent { .. } => Err(AdmissionError::NotConnected),
            SenderPhase::Established {
                close_requested: true,
                ..
            }
            | SenderPhase::FinWait { .. }
            | SenderPhase::Done => Err(AdmissionError::Closing),
            SenderPhase::Established { data, .. } => data.receive_from_app(ctx, message),
        }
    }

    fn receive_from_network(&mut self, ctx: &mut dyn SystemContext, segment: Segment) {
        if segment.is_corrupted() && !self.is_connected() {
            if self.corrupt_ack_policy() == CorruptAckPolicy::RetransmitImmediately {
                ctx.log("corrupted control reply, resending now");
                self.resend_control(ctx);
            } else {
                ctx.log("corrupted control reply ignored");
            }
            return;
        }

        match &mut self.phase {
            SenderPhase::SynSent { isn } if segment.is_syn() && segment.is_ack() => {
                let Some(peer_isn) = segment.seq() else {
                    ctx.log(&format!("malformed {segment}"));
                    return;
                };
                let seq_start = *isn + 1;
                ctx.end_timer();
                ctx.send_to_network(Segment::ack_to(Role::Receiver, SeqTag::Num(peer_isn)));
                ctx.log(&format!(
                    "connected (peer isn={peer_isn}), data starts at {seq_start}"
                ));
                self.phase = SenderPhase::Established {
                    peer_isn,
                    data: GbnSender::with_initial_sequence(&self.config, seq_start),
                    close_requested: false,
                };
                ctx.allow_app_msgs();
            }
            SenderPhase::Established { peer_isn, .. } if segment.is_syn() => {
                // Our confirmation was lost and the receiver is still asking.
                ctx.send_to_network(Segment::ack_to(Role::Receiver, SeqTag::Num(*peer_isn)));
            }
            SenderPhase::Established {
                data,
                close_requested,
                ..
            } => {
                data.receive_from_network(ctx, segment);
                if *close_requested {
                    // The window may have slid open; a closing sender takes nothing new.
                    ctx.disallow_app_msgs();
                }
                self.maybe_finish(ctx);
            }
            SenderPhase::FinWait { fin } if segment.is_fin() && segment.is_ack() => {
                if segment.seq() == fin.seq() {
                    ctx.end_timer();
                    ctx.log("connection closed");
                    self.phase = SenderPhase::Done;
                }
            }
            _ => ctx.log(&format!("ignoring {segment}")),
        }
    }

    fn on_interrupt(&mut self, ctx: &mut dyn SystemContext) {
        match &mut self.phase {
            SenderPhase::Established { data, .. } => data.on_interrupt(ctx),
            SenderPhase::SynSent { .. } | SenderPhase::FinWait { .. } => {
                ctx.log("control segment timeout");
                self.resend_control(ctx);
            }
            SenderPhase::Closed | SenderPhase::Done => {
                ctx.log("timer fired with no connection activity");
            }
        }
    }

    fn close(&mut self, ctx: &mut dyn SystemContext) {
        match &mut self.phase {
            SenderPhase::Established {
                close_requested, ..
            } => {
                *close_requested = true;
                ctx.disallow_app_msgs();
                self.maybe_finish(ctx);
            }
            SenderPhase::SynSent { .. } => {
                ctx.log("close before handshake completed, aborting");
                ctx.end_timer();
                self.phase = SenderPhase::Done;
            }
            _ => {}
        }
    }

    fn is_finished(&self) -> bool {
        match &self.phase {
            SenderPhase::Done => true,
            SenderPhase::Established {
                data,
                close_requested,
                ..
            } => !close_requested && data.is_idle(),
            _ => false,
        }
    }
}

#[derive(Debug)]
struct Session {
    peer_isn: u64,
    isn: u64,
    data: GbnReceiver,
}

impl Session {
    fn syn_ack(&self) -> Segment {
        Segment::ack(SeqTag::Num(self.isn)).with_flags(flags::SYN)
    }
}

#[derive(Debug)]
enum ReceiverPhase {
    Listen,
    SynReceived(Session),
    Established(Session),
    Closed { session: Session, fin_seq: u64 },
}

#[derive(Debug)]
pub struct ConnectedReceiver {
    rng: StdRng,
    phase: ReceiverPhase,
}

impl ConnectedReceiver {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            rng: isn_rng(config.isn_seed.map(|s| s.wrapping_add(1))),
            phase: ReceiverPhase::Listen,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.phase, ReceiverPhase::Established(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.phase, ReceiverPhase::Closed { .. })
    }

    pub fn expected_sequence(&self) -> Option<u64> {
        match &self.phase {
            ReceiverPhase::Listen => None,
            ReceiverPhase::SynReceived(s)
            | ReceiverPhase::Established(s)
            | ReceiverPhase::Closed { session: s, .. } => Some(s.data.expected_sequence()),
        }
    }

    fn on_listen(&mut self, ctx: &mut dyn SystemContext, segment: Segment) {
        let peer_isn = match segment.seq() {
            Some(seq) if segment.is_syn() => seq,
            _ => {
                ctx.log(&format!("no connection, ignoring {segment}"));
                return;
            }
        };
        let isn = self.rng.random_range(0..=MAX_ISN);
        let session = Session {
            peer_isn,
            isn,
            data: GbnReceiver::with_initial_sequence(peer_isn + 1),
        };
        ctx.log(&format!("SYN isn={peer_isn}, answering with isn={isn}"));
        ctx.send_to_network(session.syn_ack());
        self.phase = ReceiverPhase::SynReceived(session);
    }
}

impl ReceiverProtocol for ConnectedReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        ctx.log("listening");
    }

    fn receive_from_client(&mut self, ctx: &mut dyn SystemContext, segment: Segment) {
        let phase = std::mem::replace(&mut self.phase, ReceiverPhase::Listen);
        self.phase = match phase {
            ReceiverPhase::Listen => {
                self.on_listen(ctx, segment);
                return;
            }
            ReceiverPhase::SynReceived(mut session) => {
                if segment.is_syn() {
                    if segment.seq() == Some(session.peer_isn) {
                        ctx.send_to_network(session.syn_ack());
                    }
                    ReceiverPhase::SynReceived(session)
                } else if segment.is_ack() && segment.seq() == Some(session.isn) {
                    ctx.log("handshake complete");
                    ReceiverPhase::Established(session)
                } else if !segment.is_corrupted()
                    && segment.seq() == Some(session.data.expected_sequence())
                {
                    // In-order data or FIN implies the sender saw our SYN+ACK.
                    ctx.log("handshake confirmed by in-order segment");
                    self.phase = ReceiverPhase::Established(session);
                    self.receive_from_client(ctx, segment);
                    return;
                } else {
                    session.data.receive_from_client(ctx, segment);
                    ReceiverPhase::SynReceived(session)
                }
            }
            ReceiverPhase::Established(mut session) => {
                let expected = session.data.expected_sequence();
                if segment.is_syn() {
                    ctx.send_to_network(session.syn_ack());
                    ReceiverPhase::Established(session)
                } else if segment.is_ack() {
                    // Late or duplicate handshake confirmation.
                    ReceiverPhase::Established(session)
                } else if segment.is_fin() && segment.seq() == Some(expected) {
                    ctx.log(&format!("FIN seq={expected}, closing"));
                    ctx.send_to_network(Segment::ack(SeqTag::Num(expected)).with_flags(flags::FIN));
                    ReceiverPhase::Closed {
                        session,
                        fin_seq: expected,
                    }
                } else {
                    session.data.receive_from_client(ctx, segment);
                    ReceiverPhase::Established(session)
                }
            }
            ReceiverPhase::Closed { session, fin_seq } => {
                if segment.is_fin() && segment.seq() == Some(fin_seq) {
                    ctx.send_to_network(Segment::ack(SeqTag::Num(fin_seq)).with_flags(flags::FIN));
                } else {
                    ctx.log(&format!("closed, ignoring {segment}"));
                }
                ReceiverPhase::Closed { session, fin_seq }
            }
        };
    }
}
