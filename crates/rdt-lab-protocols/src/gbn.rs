//! Go-Back-N sliding window.
//!
//! [`GbnSender`] keeps up to `N` data segments in flight. ACKs are
//! cumulative: `ACK k` confirms every sequence number up to and including
//! `k`. On timeout the sender resends every outstanding segment, oldest
//! first. [`GbnReceiver`] accepts strictly in-order segments and discards
//! everything else.
//!
//! ```text
//!  base          next_sequence
//!    │                 │
//! ───┼─────────────────┼─────────────▶ seq space
//!    │<── in flight ──>│<─ sendable ─> (up to base + N)
//! ```

use rdt_lab_abstract::{
    AdmissionError, CorruptAckPolicy, ProtocolConfig, ReceiverProtocol, SeqTag, Segment,
    SenderProtocol, SystemContext,
};

#[derive(Debug)]
pub struct GbnSender {
    base: u64,
    next_sequence: u64,
    window_size: usize,
    /// Retained copies, slot `seq % window_size`. Slots are overwritten as
    /// the window slides, never cleared one by one.
    unacked: Vec<Option<Segment>>,
    retransmit_interval: u64,
    corrupt_ack_policy: CorruptAckPolicy,
}

impl GbnSender {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self::with_initial_sequence(config, 0)
    }

    /// Sender whose first data segment carries `seq_start`
    /// (the negotiated value after a handshake).
    pub fn with_initial_sequence(config: &ProtocolConfig, seq_start: u64) -> Self {
        let window_size = config.window_size.max(1);
        Self {
            base: seq_start,
            next_sequence: seq_start,
            window_size,
            unacked: vec![None; window_size],
            retransmit_interval: config.retransmit_interval,
            corrupt_ack_policy: config
                .corrupt_ack_policy
                .unwrap_or(CorruptAckPolicy::AwaitTimeout),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of segments awaiting acknowledgement.
    pub fn in_flight(&self) -> u64 {
        self.next_sequence - self.base
    }

    /// `true` when there is room for at least one more in-flight segment.
    pub fn can_send(&self) -> bool {
        self.in_flight() < self.window_size as u64
    }

    /// `true` when nothing is outstanding.
    pub fn is_idle(&self) -> bool {
        self.base == self.next_sequence
    }

    fn slot(&self, seq: u64) -> usize {
        (seq % self.window_size as u64) as usize
    }

    fn resend_window(&self, ctx: &mut dyn SystemContext) {
        for seq in self.base..self.next_sequence {
            match &self.unacked[self.slot(seq)] {
                Some(segment) => ctx.send_to_network(segment.clone()),
                None => ctx.log(&format!("GBN missing retained copy for seq {seq}")),
            }
        }
        ctx.start_timer(self.retransmit_interval);
    }
}

impl SenderProtocol for GbnSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        ctx.log(&format!("GBN sender ready (N={})", self.window_size));
        ctx.allow_app_msgs();
    }

    fn receive_from_app(
        &mut self,
        ctx: &mut dyn SystemContext,
        message: &[u8],
    ) -> Result<(), AdmissionError> {
        if !self.can_send() {
            return Err(AdmissionError::WindowFull {
                base: self.base,
                next_sequence: self.next_sequence,
                window_size: self.window_size,
            });
        }

        let seq = self.next_sequence;
        let segment = Segment::data(message.to_vec(), Some(SeqTag::Num(seq)));
        ctx.log(&format!("GBN send {segment}"));
        ctx.send_to_network(segment.clone());
        let slot = self.slot(seq);
        self.unacked[slot] = Some(segment);

        if seq == self.base {
            ctx.start_timer(self.retransmit_interval);
        }
        self.next_sequence += 1;
        if !self.can_send() {
            ctx.disallow_app_msgs();
        }
        ctx.record_metric("in_flight", self.in_flight() as f64);
        Ok(())
    }

    fn receive_from_network(&mut self, ctx: &mut dyn SystemContext, segment: Segment) {
        if segment.is_corrupted() {
            match self.corrupt_ack_policy {
                CorruptAckPolicy::RetransmitImmediately if !self.is_idle() => {
                    ctx.log("GBN corrupted ACK, resending window now");
                    self.resend_window(ctx);
                }
                _ => ctx.log("GBN corrupted ACK ignored"),
            }
            return;
        }

        let ack = match (segment.is_ack(), segment.seq()) {
            (true, Some(ack)) => ack,
            _ => {
                ctx.log(&format!("GBN sender ignoring {segment}"));
                return;
            }
        };

        // Only move the window forward: an ACK below base is a duplicate and
        // one at or past next_sequence acknowledges nothing we sent.
        if ack < self.base || ack >= self.next_sequence {
            ctx.log(&format!(
                "GBN duplicate/out-of-range ACK {ack} (base={}, next={})",
                self.base, self.next_sequence
            ));
            return;
        }

        self.base = ack + 1;
        ctx.log(&format!("GBN cumulative ACK {ack}, base -> {}", self.base));
        ctx.allow_app_msgs();
        if self.is_idle() {
            ctx.end_timer();
        } else {
            ctx.start_timer(self.retransmit_interval);
        }
        ctx.record_metric("in_flight", self.in_flight() as f64);
    }

    fn on_interrupt(&mut self, ctx: &mut dyn SystemContext) {
        if self.is_idle() {
            ctx.log("GBN timer fired with nothing outstanding");
            return;
        }
        ctx.log(&format!(
            "GBN timeout, going back to {} ({} segments)",
            self.base,
            self.in_flight()
        ));
        self.resend_window(ctx);
    }

    fn is_finished(&self) -> bool {
        self.is_idle()
    }
}

#[derive(Debug, Default)]
pub struct GbnReceiver {
    expected_sequence: u64,
}

impl GbnReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receiver expecting `expected_sequence` as its first data segment.
    pub fn with_initial_sequence(expected_sequence: u64) -> Self {
        Self { expected_sequence }
    }

    pub fn expected_sequence(&self) -> u64 {
        self.expected_sequence
    }

    /// Re-assert the cumulative point. Before anything has been accepted at
    /// sequence zero there is no such point, so nothing is sent.
    pub(crate) fn reack(&self, ctx: &mut dyn SystemContext) {
        match self.expected_sequence.checked_sub(1) {
            Some(last) => ctx.send_to_network(Segment::ack(SeqTag::Num(last))),
            None => ctx.log("GBN nothing accepted yet, no ACK to repeat"),
        }
    }
}

impl ReceiverProtocol for GbnReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        ctx.log("GBN receiver ready");
    }

    fn receive_from_client(&mut self, ctx: &mut dyn SystemContext, segment: Segment) {
        let in_order = segment.seq() == Some(self.expected_sequence);
        match segment.message() {
            Some(message) if in_order => {
                ctx.log(&format!(
                    "GBN received seq {} ({} bytes)",
                    self.expected_sequence,
                    message.len()
                ));
                ctx.send_to_app(message);
                ctx.send_to_network(Segment::ack(SeqTag::Num(self.expected_sequence)));
                self.expected_sequence += 1;
            }
            _ => {
                ctx.log(&format!(
                    "GBN discarding {segment} (expect seq {})",
                    self.expected_sequence
                ));
                self.reack(ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingContext;
    use rdt_lab_abstract::Role;

    fn sender(window: usize) -> GbnSender {
        GbnSender::new(&ProtocolConfig::default().with_window_size(window))
    }

    fn tags(segments: &[Segment]) -> Vec<u64> {
        segments.iter().filter_map(Segment::seq).collect()
    }

    #[test]
    fn initial_state() {
        let s = sender(3);
        assert_eq!(s.base(), 0);
        assert_eq!(s.next_sequence(), 0);
        assert!(s.can_send());
        assert!(s.is_idle());
    }

    #[test]
    fn fills_window_then_slides_on_acks() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(3);
        let mut rx = GbnReceiver::new();

        for msg in ["m0", "m1", "m2"] {
            tx.receive_from_app(&mut ctx, msg.as_bytes()).unwrap();
        }
        assert!(!ctx.gate_open());
        assert_eq!(ctx.timer_starts, 1);

        let data = ctx.take_sent();
        assert_eq!(tags(&data), vec![0, 1, 2]);
        for seg in data {
            rx.receive_from_client(&mut ctx, seg);
        }
        let acks = ctx.take_sent();
        assert_eq!(tags(&acks), vec![0, 1, 2]);
        for ack in acks {
            tx.receive_from_network(&mut ctx, ack);
        }

        assert_eq!(tx.base(), 3);
        assert!(tx.is_idle());
        assert_eq!(ctx.timer, None);
        assert!(ctx.gate_open());
        tx.receive_from_app(&mut ctx, b"m3").unwrap();
        assert_eq!(tags(&ctx.take_sent()), vec![3]);
    }

    #[test]
    fn full_window_rejects_without_sending() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(2);
        tx.receive_from_app(&mut ctx, b"a").unwrap();
        tx.receive_from_app(&mut ctx, b"b").unwrap();

        let err = tx.receive_from_app(&mut ctx, b"c").unwrap_err();
        assert_eq!(
            err,
            AdmissionError::WindowFull {
                base: 0,
                next_sequence: 2,
                window_size: 2
            }
        );
        assert_eq!(ctx.sent.len(), 2);
        assert!(!ctx.gate_open());
        assert_eq!(tx.next_sequence(), 2);
    }

    #[test]
    fn corrupted_middle_segment_forces_go_back() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(3);
        let mut rx = GbnReceiver::new();
        for msg in ["m0", "m1", "m2"] {
            tx.receive_from_app(&mut ctx, msg.as_bytes()).unwrap();
        }
        let mut data = ctx.take_sent();

        rx.receive_from_client(&mut ctx, data.remove(0));
        rx.receive_from_client(&mut ctx, Segment::corrupted(Role::Receiver));
        rx.receive_from_client(&mut ctx, data.remove(1));
        assert_eq!(ctx.delivered, vec![b"m0".to_vec()]);
        let acks = ctx.take_sent();
        assert_eq!(tags(&acks), vec![0, 0, 0]);

        for ack in acks {
            tx.receive_from_network(&mut ctx, ack);
        }
        assert_eq!(tx.base(), 1);
        assert!(ctx.timer.is_some());

        tx.on_interrupt(&mut ctx);
        let resent = ctx.take_sent();
        assert_eq!(tags(&resent), vec![1, 2]);
        assert_eq!(resent[0].message(), Some(&b"m1"[..]));

        for seg in resent {
            rx.receive_from_client(&mut ctx, seg);
        }
        assert_eq!(
            ctx.delivered,
            vec![b"m0".to_vec(), b"m1".to_vec(), b"m2".to_vec()]
        );
    }

    #[test]
    fn cumulative_ack_skips_lost_acks() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(4);
        for msg in ["a", "b", "c"] {
            tx.receive_from_app(&mut ctx, msg.as_bytes()).unwrap();
        }
        tx.receive_from_network(&mut ctx, Segment::ack(SeqTag::Num(2)));
        assert_eq!(tx.base(), 3);
        assert_eq!(ctx.timer, None);
    }

    #[test]
    fn stale_ack_never_moves_base_backwards() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(3);
        for msg in ["a", "b", "c"] {
            tx.receive_from_app(&mut ctx, msg.as_bytes()).unwrap();
        }
        tx.receive_from_network(&mut ctx, Segment::ack(SeqTag::Num(1)));
        tx.receive_from_network(&mut ctx, Segment::ack(SeqTag::Num(0)));
        assert_eq!(tx.base(), 2);

        tx.receive_from_network(&mut ctx, Segment::ack(SeqTag::Num(9)));
        assert_eq!(tx.base(), 2);
        assert!(tx.next_sequence() - tx.base() <= tx.window_size() as u64);
    }

    #[test]
    fn corrupted_ack_ignored_by_default() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(3);
        tx.receive_from_app(&mut ctx, b"a").unwrap();
        ctx.take_sent();

        tx.receive_from_network(&mut ctx, Segment::corrupted(Role::Sender));
        assert!(ctx.sent.is_empty());
        assert_eq!(tx.base(), 0);
    }

    #[test]
    fn corrupted_ack_resends_window_when_configured() {
        let mut ctx = RecordingContext::default();
        let config = ProtocolConfig::default()
            .with_corrupt_ack_policy(CorruptAckPolicy::RetransmitImmediately);
        let mut tx = GbnSender::new(&config);
        tx.receive_from_app(&mut ctx, b"a").unwrap();
        tx.receive_from_app(&mut ctx, b"b").unwrap();
        let original = ctx.take_sent();

        tx.receive_from_network(&mut ctx, Segment::corrupted(Role::Sender));
        assert_eq!(ctx.take_sent(), original);
    }

    #[test]
    fn retransmission_does_not_change_state() {
        let mut ctx = RecordingContext::default();
        let mut tx = sender(3);
        tx.receive_from_app(&mut ctx, b"a").unwrap();
        tx.receive_from_app(&mut ctx, b"b").unwrap();
        let first = ctx.take_sent();

        tx.on_interrupt(&mut ctx);
        tx.on_interrupt(&mut ctx);
        assert_eq!(ctx.take_sent(), [first.clone(), first].concat());
        assert_eq!(tx.base(), 0);
        assert_eq!(tx.next_sequence(), 2);
    }

    #[test]
    fn receiver_suppresses_reack_before_first_delivery() {
        let mut ctx = RecordingContext::default();
        let mut rx = GbnReceiver::new();
        rx.receive_from_client(&mut ctx, Segment::corrupted(Role::Receiver));
        rx.receive_from_client(&mut ctx, Segment::data(b"x".to_vec(), Some(SeqTag::Num(1))));
        assert!(ctx.sent.is_empty());
        assert!(ctx.delivered.is_empty());
        assert_eq!(rx.expected_sequence(), 0);
    }

    #[test]
    fn receiver_rejects_duplicates() {
        let mut ctx = RecordingContext::default();
        let mut rx = GbnReceiver::with_initial_sequence(10);
        let seg = Segment::data(b"x".to_vec(), Some(SeqTag::Num(10)));
        rx.receive_from_client(&mut ctx, seg.clone());
        rx.receive_from_client(&mut ctx, seg);
        assert_eq!(ctx.delivered.len(), 1);
        assert_eq!(tags(&ctx.take_sent()), vec![10, 10]);
    }
}
