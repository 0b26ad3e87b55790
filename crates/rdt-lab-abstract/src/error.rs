use thiserror::Error;

/// Why a sender refused an application message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("a segment is still awaiting acknowledgment")]
    AwaitingAck,
    #[error("window full: base={base} next_sequence={next_sequence} window_size={window_size}")]
    WindowFull {
        base: u64,
        next_sequence: u64,
        window_size: usize,
    },
    #[error("connection not established")]
    NotConnected,
    #[error("connection is closing")]
    Closing,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window_size must be at least 1")]
    ZeroWindow,
    #[error("retransmit_interval must be at least 1 step")]
    ZeroInterval,
    #[error("min_latency ({min}) exceeds max_latency ({max})")]
    LatencyRange { min: u64, max: u64 },
    #[error("{name} must be within [0, 1], got {value}")]
    Probability { name: &'static str, value: f64 },
}
