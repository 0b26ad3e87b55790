use crate::error::AdmissionError;
use crate::segment::Segment;

/// The capabilities the simulator provides to a protocol role.
/// Roles call these methods to interact with the channel, the logical timer
/// and the application layer.
pub trait SystemContext {
    /// Hand a segment to the unreliable channel. The channel may drop it or
    /// replace its payload with [`crate::Payload::Corrupted`].
    fn send_to_network(&mut self, segment: Segment);

    /// Deliver a message to the local application sink.
    fn send_to_app(&mut self, message: &[u8]);

    /// Start the role's retransmission timer. `interval` is in simulation steps.
    /// Starting a timer invalidates any fire scheduled by an earlier start.
    fn start_timer(&mut self, interval: u64);

    /// Cancel the role's timer, if one is pending.
    fn end_timer(&mut self);

    /// Open the admission gate: the application may submit messages again.
    fn allow_app_msgs(&mut self);

    /// Close the admission gate.
    fn disallow_app_msgs(&mut self);

    /// Log a message to the simulator's debug output.
    fn log(&mut self, message: &str);

    /// Current simulation step.
    fn now(&self) -> u64;

    /// Record a numeric metric for the run report (e.g. segments in flight).
    fn record_metric(&mut self, _name: &str, _value: f64) {
        // Default no-op so non-reporting environments don't need to care.
    }
}

/// Sending half of a protocol family.
pub trait SenderProtocol {
    /// Called once when the simulation starts.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// The application hands over a message. A rejected message sends nothing
    /// and leaves the sender untouched; the application should retry after
    /// the admission gate reopens.
    fn receive_from_app(
        &mut self,
        ctx: &mut dyn SystemContext,
        message: &[u8],
    ) -> Result<(), AdmissionError>;

    /// A segment addressed to the sender arrived from the channel.
    fn receive_from_network(&mut self, ctx: &mut dyn SystemContext, segment: Segment);

    /// The retransmission timer fired.
    fn on_interrupt(&mut self, ctx: &mut dyn SystemContext);

    /// The application has no more data and asks for a graceful close.
    fn close(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Whether every accepted message has been acknowledged.
    fn is_finished(&self) -> bool {
        true
    }
}

/// Receiving half of a protocol family.
pub trait ReceiverProtocol {
    /// Called once when the simulation starts.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// A segment addressed to the receiver arrived from the channel.
    fn receive_from_client(&mut self, ctx: &mut dyn SystemContext, segment: Segment);
}
