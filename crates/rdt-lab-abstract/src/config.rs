use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ConfigError;

/// Channel and application-source parameters for one simulated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
    /// Steps between generated application messages.
    pub app_interval: u64,
    /// The run stops once simulated time passes this step.
    pub time_limit: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 10,
            max_latency: 100,
            seed: 0,
            app_interval: 50,
            time_limit: 1_000_000,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_rate", self.loss_rate),
            ("corrupt_rate", self.corrupt_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        if self.min_latency > self.max_latency {
            return Err(ConfigError::LatencyRange {
                min: self.min_latency,
                max: self.max_latency,
            });
        }
        Ok(())
    }
}

/// What a sender does when an acknowledgment arrives garbled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptAckPolicy {
    /// Discard it; the retransmission timer drives recovery.
    AwaitTimeout,
    /// Act as if the timer fired: resend what is outstanding and restart it.
    RetransmitImmediately,
}

impl FromStr for CorruptAckPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "await-timeout" | "await_timeout" | "timeout" => Ok(Self::AwaitTimeout),
            "retransmit-immediately" | "retransmit_immediately" | "retransmit" => {
                Ok(Self::RetransmitImmediately)
            }
            other => Err(format!(
                "unknown corrupt-ACK policy '{other}'. Try 'await-timeout' or 'retransmit'."
            )),
        }
    }
}

/// Construction-time protocol parameters. Immutable once a role is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Retransmission timeout in simulation steps.
    pub retransmit_interval: u64,
    /// Go-Back-N window size N.
    pub window_size: usize,
    /// `None` picks the family default: stop-and-wait retransmits
    /// immediately, Go-Back-N waits for the timer.
    pub corrupt_ack_policy: Option<CorruptAckPolicy>,
    /// Seed for initial sequence numbers chosen during the handshake.
    pub isn_seed: Option<u64>,
}

pub const DEFAULT_WINDOW_SIZE: usize = 3;
pub const DEFAULT_RETRANSMIT_INTERVAL: u64 = 250;

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
            window_size: DEFAULT_WINDOW_SIZE,
            corrupt_ack_policy: None,
            isn_seed: None,
        }
    }
}

impl ProtocolConfig {
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_retransmit_interval(mut self, interval: u64) -> Self {
        self.retransmit_interval = interval;
        self
    }

    pub fn with_corrupt_ack_policy(mut self, policy: CorruptAckPolicy) -> Self {
        self.corrupt_ack_policy = Some(policy);
        self
    }

    pub fn with_isn_seed(mut self, seed: u64) -> Self {
        self.isn_seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.retransmit_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}
