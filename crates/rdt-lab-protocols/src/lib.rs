//! Reliable-data-transfer protocol engines.
//!
//! Each family is a sender/receiver pair implementing
//! [`SenderProtocol`](rdt_lab_abstract::SenderProtocol) and
//! [`ReceiverProtocol`](rdt_lab_abstract::ReceiverProtocol). Pick one with
//! [`registry::build_pair`].

pub mod alternating;
pub mod gbn;
pub mod lifecycle;
pub mod naive;
pub mod registry;

#[cfg(test)]
mod testing;

pub use alternating::{AltBitReceiver, AltBitSender};
pub use gbn::{GbnReceiver, GbnSender};
pub use lifecycle::{ConnectedReceiver, ConnectedSender};
pub use naive::{NaiveReceiver, NaiveSender};
pub use registry::{ProtocolKind, ProtocolPair, build_pair, pair_by_name};
