use rdt_lab_abstract::{AdmissionError, ReceiverProtocol, Segment, SenderProtocol, SystemContext};

/// Pass-through sender (assumes a perfect channel, no tags/ACK/timer).
#[derive(Default)]
pub struct NaiveSender;

impl SenderProtocol for NaiveSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        ctx.log("naive sender ready (no reliability)");
    }

    fn receive_from_app(
        &mut self,
        ctx: &mut dyn SystemContext,
        message: &[u8],
    ) -> Result<(), AdmissionError> {
        let segment = Segment::data(message.to_vec(), None);
        ctx.log(&format!(
            "naive sender pushing {} bytes to channel",
            segment.len()
        ));
        ctx.send_to_network(segment);
        Ok(())
    }

    fn receive_from_network(&mut self, _ctx: &mut dyn SystemContext, _segment: Segment) {
        // Nothing to do; nobody sends anything back.
    }

    fn on_interrupt(&mut self, _ctx: &mut dyn SystemContext) {}
}

/// Pass-through receiver: delivers whatever intact data arrives.
#[derive(Default)]
pub struct NaiveReceiver;

impl ReceiverProtocol for NaiveReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        ctx.log("naive receiver ready (no reliability)");
    }

    fn receive_from_client(&mut self, ctx: &mut dyn SystemContext, segment: Segment) {
        match segment.message() {
            Some(message) => {
                ctx.log(&format!("naive receiver delivering {} bytes", message.len()));
                ctx.send_to_app(message);
            }
            None => ctx.log(&format!("naive receiver dropping {segment}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingContext;

    #[test]
    fn sender_wraps_without_tag_or_timer() {
        let mut ctx = RecordingContext::default();
        let mut sender = NaiveSender;
        sender.receive_from_app(&mut ctx, b"A").unwrap();
        sender.receive_from_app(&mut ctx, b"B").unwrap();

        assert_eq!(ctx.sent.len(), 2);
        assert_eq!(ctx.sent[0].sequence_tag, None);
        assert_eq!(ctx.sent[1].message(), Some(&b"B"[..]));
        assert_eq!(ctx.timer_starts, 0);
    }

    #[test]
    fn receiver_delivers_data_and_drops_corruption() {
        let mut ctx = RecordingContext::default();
        let mut receiver = NaiveReceiver;
        receiver.receive_from_client(&mut ctx, Segment::data(b"A".to_vec(), None));
        receiver.receive_from_client(
            &mut ctx,
            Segment::corrupted(rdt_lab_abstract::Role::Receiver),
        );

        assert_eq!(ctx.delivered, vec![b"A".to_vec()]);
        assert!(ctx.sent.is_empty());
    }
}
