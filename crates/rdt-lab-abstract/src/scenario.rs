use crate::config::{ProtocolConfig, SimConfig};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    /// Builtin protocol family to run, e.g. "gbn". The caller may override it.
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub protocol_config: ProtocolConfig,
    #[serde(default)]
    pub config: SimConfigOverride,
    pub actions: Vec<TestAction>,
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
    pub app_interval: Option<u64>,
    pub time_limit: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.app_interval {
            config.app_interval = v;
        }
        if let Some(v) = self.time_limit {
            config.time_limit = v;
        }
    }
}

/// Tag selector for deterministic faults: a sequence number or an alternating bit.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum TagMatch {
    Bit(bool),
    Num(u64),
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Application offers data at a specific step
    AppSend { time: u64, data: String },
    /// Application asks the sender to close the connection
    Close { time: u64 },
    /// Deterministically drop the first segment sent by Sender with given tag
    DropNextFromSenderSeq { seq: TagMatch },
    /// Deterministically drop the first ACK sent by Receiver with given tag
    DropNextFromReceiverAck { ack: TagMatch },
    /// Deterministically corrupt the first segment sent by Sender with given tag
    CorruptNextFromSenderSeq { seq: TagMatch },
    /// Deterministically corrupt the first ACK sent by Receiver with given tag
    CorruptNextFromReceiverAck { ack: TagMatch },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that specific data was delivered to the application layer
    DataDelivered { data: String },
    /// Assert the exact ordered list of deliveries
    DeliveredInOrder { data: Vec<String> },
    /// Assert that no message was delivered twice
    NoDuplicates,
    /// Assert that the total number of segments sent by Sender is within range
    SenderSegmentCount { min: u32, max: Option<u32> },
    /// Assert that simulation finishes within the given number of steps
    MaxDuration { steps: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_only_touches_given_fields() {
        let mut cfg = SimConfig::default();
        let ov = SimConfigOverride {
            loss_rate: Some(0.25),
            seed: Some(9),
            ..Default::default()
        };
        ov.apply_to(&mut cfg);
        assert_eq!(cfg.loss_rate, 0.25);
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.min_latency, SimConfig::default().min_latency);
    }
}
