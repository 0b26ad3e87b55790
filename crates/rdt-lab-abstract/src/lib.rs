//! Shared vocabulary for the reliable-data-transfer lab: the wire segment,
//! the capabilities a protocol role may use, and the role traits themselves.

pub mod config;
pub mod error;
pub mod interface;
pub mod scenario;
pub mod segment;

pub use interface::{ReceiverProtocol, SenderProtocol, SystemContext};
pub use segment::{Payload, Role, SeqTag, Segment};
// Re-export flags so callers can write `rdt_lab_abstract::flags::SYN`
pub use segment::flags;

pub use config::{CorruptAckPolicy, ProtocolConfig, SimConfig};
pub use error::{AdmissionError, ConfigError};
pub use scenario::{SimConfigOverride, TagMatch, TestAction, TestAssertion, TestScenario};
