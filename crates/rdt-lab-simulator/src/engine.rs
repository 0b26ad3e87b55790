use rand::Rng;
use rdt_lab_abstract::{
    AdmissionError, ReceiverProtocol, Role, Segment, SenderProtocol, SeqTag, SimConfig,
    SystemContext, TagMatch,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::trace::SimulationReport;

#[derive(Debug)]
pub enum EventType {
    SegmentArrival {
        to: Role,
        segment: Segment,
    },
    TimerExpiry {
        node: Role,
        generation: u64,
    },
    AppSend {
        data: Vec<u8>,
    },
    AppClose,
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of important channel events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
enum TimerCommand {
    Start(u64),
    Cancel,
}

/// Actions buffered during one entry-point call
#[derive(Default)]
struct ActionBuffer {
    outgoing_segments: Vec<Segment>,
    timer_commands: Vec<TimerCommand>,
    admission: Option<bool>,
    logs: Vec<String>,
    delivered_data: Vec<Vec<u8>>,
    metrics: Vec<(String, f64)>,
}

/// Context implementation passed to a role
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    now: u64,
}

impl<'a> SystemContext for ScopedContext<'a> {
    fn send_to_network(&mut self, segment: Segment) {
        self.buffer.outgoing_segments.push(segment);
    }

    fn send_to_app(&mut self, message: &[u8]) {
        self.buffer.delivered_data.push(message.to_vec());
    }

    fn start_timer(&mut self, interval: u64) {
        self.buffer.timer_commands.push(TimerCommand::Start(interval));
    }

    fn end_timer(&mut self) {
        self.buffer.timer_commands.push(TimerCommand::Cancel);
    }

    fn allow_app_msgs(&mut self) {
        self.buffer.admission = Some(true);
    }

    fn disallow_app_msgs(&mut self) {
        self.buffer.admission = Some(false);
    }

    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

fn tag_matches(selector: TagMatch, tag: Option<SeqTag>) -> bool {
    match (selector, tag) {
        (TagMatch::Num(want), Some(SeqTag::Num(got))) => want == got,
        (TagMatch::Bit(want), Some(SeqTag::Bit(got))) => want == got,
        _ => false,
    }
}

/// Discrete-step simulation of one sender/receiver pair over an unreliable
/// channel. Drives the roles' entry points one at a time, never reentrantly.
pub struct Simulator {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    rng: rand::rngs::StdRng,

    pub sender: Box<dyn SenderProtocol>,
    pub receiver: Box<dyn ReceiverProtocol>,

    // Stats for the report
    pub delivered_data: Vec<Vec<u8>>,
    pub sender_segment_count: u32,
    pub receiver_segment_count: u32,
    /// Times the sender refused a message the application offered.
    pub app_rejections: u32,

    /// Arbitrary time-series metrics recorded via `SystemContext::record_metric`
    /// Key: metric name (e.g., "in_flight"), Value: Vec<(step, value)>
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    // Deterministic fault injection, each consumed by the first match
    drop_sender_seq_once: Vec<TagMatch>,
    drop_receiver_ack_once: Vec<TagMatch>,
    corrupt_sender_seq_once: Vec<TagMatch>,
    corrupt_receiver_ack_once: Vec<TagMatch>,

    /// Timeline of channel events (drops, corruptions, sends, deliveries).
    pub link_events: Vec<LinkEventSummary>,

    /// Timer generation per role; a fire is valid only if it carries the
    /// current generation.
    timer_generations: HashMap<Role, u64>,

    /// Latest scheduled arrival per destination, keeps each direction FIFO.
    last_arrival: HashMap<Role, u64>,

    // Application source state
    admission_open: bool,
    backlog: VecDeque<Vec<u8>>,
    close_pending: bool,
    timed_out: bool,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        sender: Box<dyn SenderProtocol>,
        receiver: Box<dyn ReceiverProtocol>,
    ) -> Self {
        use rand::SeedableRng;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            rng,
            sender,
            receiver,
            delivered_data: Vec::new(),
            sender_segment_count: 0,
            receiver_segment_count: 0,
            app_rejections: 0,
            metrics: HashMap::new(),
            drop_sender_seq_once: Vec::new(),
            drop_receiver_ack_once: Vec::new(),
            corrupt_sender_seq_once: Vec::new(),
            corrupt_receiver_ack_once: Vec::new(),
            link_events: Vec::new(),
            timer_generations: HashMap::new(),
            last_arrival: HashMap::new(),
            admission_open: true,
            backlog: VecDeque::new(),
            close_pending: false,
            timed_out: false,
        }
    }

    /// Register a deterministic fault: drop the first segment sent by Sender with this tag.
    pub fn add_drop_sender_seq_once(&mut self, seq: TagMatch) {
        self.drop_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: drop the first ACK sent by Receiver with this tag.
    pub fn add_drop_receiver_ack_once(&mut self, ack: TagMatch) {
        self.drop_receiver_ack_once.push(ack);
    }

    /// Register a deterministic fault: corrupt the first segment sent by Sender with this tag.
    pub fn add_corrupt_sender_seq_once(&mut self, seq: TagMatch) {
        self.corrupt_sender_seq_once.push(seq);
    }

    /// Register a deterministic fault: corrupt the first ACK sent by Receiver with this tag.
    pub fn add_corrupt_receiver_ack_once(&mut self, ack: TagMatch) {
        self.corrupt_receiver_ack_once.push(ack);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Return a slice of (step, value) samples for a named metric, if present.
    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    /// The application offers `data` at step `time`.
    pub fn schedule_app_send(&mut self, time: u64, data: Vec<u8>) {
        self.push_event(time, EventType::AppSend { data });
    }

    /// Offer `count` generated messages, one every `app_interval` steps.
    pub fn schedule_messages(&mut self, count: usize) {
        for i in 0..count {
            let time = i as u64 * self.config.app_interval;
            self.schedule_app_send(time, format!("msg-{i:03}").into_bytes());
        }
    }

    /// The application asks for a graceful close at step `time`, once every
    /// message offered before it has been accepted.
    pub fn schedule_close(&mut self, time: u64) {
        self.push_event(time, EventType::AppClose);
    }

    pub fn init(&mut self) {
        let mut buffer = ActionBuffer::default();
        self.sender.init(&mut ScopedContext {
            buffer: &mut buffer,
            now: self.time,
        });
        self.process_actions(Role::Sender, buffer);

        let mut buffer = ActionBuffer::default();
        self.receiver.init(&mut ScopedContext {
            buffer: &mut buffer,
            now: self.time,
        });
        self.process_actions(Role::Receiver, buffer);
    }

    fn peek_next_event_time(&self) -> Option<u64> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    /// Messages the application offered that the sender has not accepted yet.
    pub fn pending_app_messages(&self) -> usize {
        self.backlog.len()
    }

    pub fn admission_open(&self) -> bool {
        self.admission_open
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Process the next event. Returns true if an event was processed, false if queue is empty.
    pub fn step(&mut self) -> bool {
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        self.time = event.time;
        debug!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::SegmentArrival { to, segment } => {
                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    match to {
                        Role::Sender => self.sender.receive_from_network(&mut ctx, segment),
                        Role::Receiver => self.receiver.receive_from_client(&mut ctx, segment),
                    }
                }
                self.process_actions(to, buffer);
            }
            EventType::TimerExpiry { node, generation } => {
                let current = self.timer_generations.get(&node).copied().unwrap_or(0);
                if current != generation {
                    // Cancelled or superseded by a later start
                    debug!("Skipping stale timer event for {:?}", node);
                    return true;
                }
                if node == Role::Receiver {
                    debug!("Receiver timers are not delivered");
                    return true;
                }

                let mut buffer = ActionBuffer::default();
                {
                    let mut ctx = ScopedContext {
                        buffer: &mut buffer,
                        now: self.time,
                    };
                    self.sender.on_interrupt(&mut ctx);
                }
                self.process_actions(node, buffer);
            }
            EventType::AppSend { data } => {
                self.backlog.push_back(data);
            }
            EventType::AppClose => {
                self.close_pending = true;
            }
        }

        self.feed_app();
        true
    }

    /// Offer backlog messages while the admission gate is open, then deliver
    /// a pending close once the backlog is empty.
    fn feed_app(&mut self) {
        while self.admission_open {
            let Some(data) = self.backlog.pop_front() else {
                break;
            };
            let mut buffer = ActionBuffer::default();
            let result = self.sender.receive_from_app(
                &mut ScopedContext {
                    buffer: &mut buffer,
                    now: self.time,
                },
                &data,
            );
            self.process_actions(Role::Sender, buffer);
            if let Err(err) = result {
                self.reject(data, err);
                break;
            }
        }

        if self.close_pending && self.backlog.is_empty() {
            self.close_pending = false;
            let mut buffer = ActionBuffer::default();
            self.sender.close(&mut ScopedContext {
                buffer: &mut buffer,
                now: self.time,
            });
            self.process_actions(Role::Sender, buffer);
        }
    }

    fn reject(&mut self, data: Vec<u8>, err: AdmissionError) {
        debug!("Sender rejected application message: {}", err);
        self.app_rejections += 1;
        self.backlog.push_front(data);
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration: self.time,
            delivered_data: self.delivered_data.clone(),
            sender_segment_count: self.sender_segment_count,
            receiver_segment_count: self.receiver_segment_count,
            app_rejections: self.app_rejections,
            pending_app_messages: self.backlog.len(),
            sender_finished: self.sender.is_finished(),
            timed_out: self.timed_out,
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    /// Process events until the queue drains or `time_limit` is passed.
    pub fn run(&mut self) {
        while let Some(next) = self.peek_next_event_time() {
            if next > self.config.time_limit {
                warn!(
                    "Stopping at step {}: time limit {} reached with {} events queued",
                    self.time,
                    self.config.time_limit,
                    self.event_queue.len()
                );
                self.timed_out = true;
                break;
            }
            self.step();
        }
    }

    pub fn run_until_complete(&mut self) {
        self.init();
        self.run();
    }

    fn process_actions(&mut self, source_node: Role, buffer: ActionBuffer) {
        // First, fold metrics into simulator-wide store
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(name)
                .or_default()
                .push((self.time, value));
        }

        for log in buffer.logs {
            info!("[{:?}] {}", source_node, log);
        }

        for data in buffer.delivered_data {
            info!("[{:?}] DELIVERED DATA: {} bytes", source_node, data.len());
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}] DELIVERED {} bytes to application",
                    source_node,
                    data.len()
                ),
            });
            self.delivered_data.push(data);
        }

        if let Some(open) = buffer.admission {
            if source_node == Role::Sender {
                self.admission_open = open;
            } else {
                debug!("Ignoring admission toggle from {:?}", source_node);
            }
        }

        // Every start or cancel bumps the generation, so only the newest
        // start can ever fire.
        for command in buffer.timer_commands {
            let generation = self.timer_generations.entry(source_node).or_insert(0);
            *generation += 1;
            let generation = *generation;
            if let TimerCommand::Start(delay) = command {
                self.push_event(
                    self.time + delay,
                    EventType::TimerExpiry {
                        node: source_node,
                        generation,
                    },
                );
            }
        }

        // Segment transmission logic (Channel)
        for segment in buffer.outgoing_segments {
            self.transmit(source_node, segment);
        }
    }

    fn transmit(&mut self, source_node: Role, mut segment: Segment) {
        let target_node = source_node.peer();
        if segment.destination != target_node {
            debug!(
                "{:?} addressed {} to {:?}; routing to {:?}",
                source_node, segment, segment.destination, target_node
            );
        }

        let (drop_list, corrupt_list) = match source_node {
            Role::Sender => {
                self.sender_segment_count += 1;
                (&mut self.drop_sender_seq_once, &mut self.corrupt_sender_seq_once)
            }
            Role::Receiver => {
                self.receiver_segment_count += 1;
                (&mut self.drop_receiver_ack_once, &mut self.corrupt_receiver_ack_once)
            }
        };
        // Receiver-side faults only apply to ACKs
        let eligible = source_node == Role::Sender || segment.is_ack();

        if eligible
            && let Some(pos) = drop_list
                .iter()
                .position(|m| tag_matches(*m, segment.sequence_tag))
        {
            drop_list.remove(pos);
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}->{:?}] DROP (deterministic) {}",
                    source_node, target_node, segment
                ),
            });
            debug!("Deterministically dropping {}", segment);
            return;
        }

        let mut corrupt = false;
        if eligible
            && let Some(pos) = corrupt_list
                .iter()
                .position(|m| tag_matches(*m, segment.sequence_tag))
        {
            corrupt_list.remove(pos);
            corrupt = true;
        }

        // 1. Check Loss
        if self.rng.random::<f64>() < self.config.loss_rate {
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}->{:?}] DROP (random loss) {}",
                    source_node, target_node, segment
                ),
            });
            debug!("Segment lost in channel");
            return;
        }

        // 2. Check Corruption
        if self.rng.random::<f64>() < self.config.corrupt_rate || corrupt {
            self.link_events.push(LinkEventSummary {
                time: self.time,
                description: format!(
                    "[{:?}->{:?}] CORRUPT {}",
                    source_node, target_node, segment
                ),
            });
            debug!("Segment corrupted in channel");
            segment = Segment::corrupted(target_node);
        }

        // 3. Calculate Latency, never overtaking an earlier segment
        let latency = self
            .rng
            .random_range(self.config.min_latency..=self.config.max_latency);
        let last = self.last_arrival.entry(target_node).or_insert(0);
        let arrival_time = (self.time + latency).max(*last);
        *last = arrival_time;

        self.link_events.push(LinkEventSummary {
            time: self.time,
            description: format!(
                "[{:?}->{:?}] SEND {} (arrives at {})",
                source_node, target_node, segment, arrival_time
            ),
        });

        self.push_event(
            arrival_time,
            EventType::SegmentArrival {
                to: target_node,
                segment,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::Simulator;
    use rdt_lab_abstract::{
        AdmissionError, ReceiverProtocol, Segment, SenderProtocol, SimConfig, SystemContext,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Observed {
        fires: u32,
        accepted: Vec<Vec<u8>>,
    }

    /// Starts a timer at init, restarts it once from a second message, and
    /// closes the admission gate after two messages.
    struct TimerProbe {
        seen: Rc<RefCell<Observed>>,
    }

    impl SenderProtocol for TimerProbe {
        fn init(&mut self, ctx: &mut dyn SystemContext) {
            ctx.start_timer(10);
        }

        fn receive_from_app(
            &mut self,
            ctx: &mut dyn SystemContext,
            message: &[u8],
        ) -> Result<(), AdmissionError> {
            let mut seen = self.seen.borrow_mut();
            seen.accepted.push(message.to_vec());
            match seen.accepted.len() {
                // Restart: the fire scheduled at init must not be delivered.
                1 => ctx.start_timer(20),
                2 => ctx.disallow_app_msgs(),
                _ => {}
            }
            Ok(())
        }

        fn receive_from_network(&mut self, _ctx: &mut dyn SystemContext, _segment: Segment) {}

        fn on_interrupt(&mut self, ctx: &mut dyn SystemContext) {
            self.seen.borrow_mut().fires += 1;
            ctx.allow_app_msgs();
        }
    }

    struct Sink;

    impl ReceiverProtocol for Sink {
        fn receive_from_client(&mut self, _ctx: &mut dyn SystemContext, _segment: Segment) {}
    }

    #[test]
    fn restarted_timer_fires_once_and_gate_holds_messages() {
        let seen = Rc::new(RefCell::new(Observed::default()));
        let sender = Box::new(TimerProbe { seen: seen.clone() });
        let mut sim = Simulator::new(SimConfig::default(), sender, Box::new(Sink));

        sim.schedule_app_send(1, b"a".to_vec());
        sim.schedule_app_send(2, b"b".to_vec());
        sim.schedule_app_send(3, b"c".to_vec());
        sim.run_until_complete();

        let seen = seen.borrow();
        assert_eq!(seen.fires, 1, "superseded timer must not fire");
        assert_eq!(seen.accepted, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(sim.current_time(), 21);
        assert_eq!(sim.pending_app_messages(), 0);
        assert!(sim.admission_open(), "the timer reopened the gate");
    }

    #[test]
    fn time_limit_stops_the_run() {
        struct Chatty;
        impl SenderProtocol for Chatty {
            fn init(&mut self, ctx: &mut dyn SystemContext) {
                ctx.start_timer(5);
            }
            fn receive_from_app(
                &mut self,
                _ctx: &mut dyn SystemContext,
                _message: &[u8],
            ) -> Result<(), AdmissionError> {
                Ok(())
            }
            fn receive_from_network(&mut self, _ctx: &mut dyn SystemContext, _segment: Segment) {}
            fn on_interrupt(&mut self, ctx: &mut dyn SystemContext) {
                ctx.start_timer(5);
            }
        }

        let config = SimConfig {
            time_limit: 100,
            ..Default::default()
        };
        let mut sim = Simulator::new(config, Box::new(Chatty), Box::new(Sink));
        sim.run_until_complete();
        assert!(sim.timed_out());
        assert_eq!(sim.current_time(), 100);
    }
}
