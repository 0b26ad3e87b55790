use rdt_lab_abstract::{Segment, SystemContext};

/// Context double that records every capability call a role makes.
#[derive(Debug, Default)]
pub struct RecordingContext {
    pub sent: Vec<Segment>,
    pub delivered: Vec<Vec<u8>>,
    /// Interval of the currently running timer, if any.
    pub timer: Option<u64>,
    pub timer_starts: u32,
    pub timer_cancels: u32,
    /// Last admission toggle; `None` until a role touches the gate.
    pub admission: Option<bool>,
    pub logs: Vec<String>,
    pub now: u64,
}

impl RecordingContext {
    /// Remove and return everything sent so far.
    pub fn take_sent(&mut self) -> Vec<Segment> {
        std::mem::take(&mut self.sent)
    }

    pub fn gate_open(&self) -> bool {
        self.admission.unwrap_or(true)
    }
}

impl SystemContext for RecordingContext {
    fn send_to_network(&mut self, segment: Segment) {
        self.sent.push(segment);
    }

    fn send_to_app(&mut self, message: &[u8]) {
        self.delivered.push(message.to_vec());
    }

    fn start_timer(&mut self, interval: u64) {
        self.timer = Some(interval);
        self.timer_starts += 1;
    }

    fn end_timer(&mut self) {
        self.timer = None;
        self.timer_cancels += 1;
    }

    fn allow_app_msgs(&mut self) {
        self.admission = Some(true);
    }

    fn disallow_app_msgs(&mut self) {
        self.admission = Some(false);
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }
}
