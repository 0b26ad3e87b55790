use rdt_lab_abstract::SimConfig;
use serde::Serialize;
use std::collections::HashMap;

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    /// Step at which the last processed event happened.
    pub duration: u64,
    pub delivered_data: Vec<Vec<u8>>,
    pub sender_segment_count: u32,
    pub receiver_segment_count: u32,
    pub app_rejections: u32,
    /// Messages still waiting in the application backlog.
    pub pending_app_messages: usize,
    pub sender_finished: bool,
    pub timed_out: bool,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    /// Delivered messages as text, for logs and assertions.
    pub fn delivered_strings(&self) -> Vec<String> {
        self.delivered_data
            .iter()
            .map(|d| String::from_utf8_lossy(d).into_owned())
            .collect()
    }
}
