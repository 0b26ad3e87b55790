use anyhow::{Context, Result};
use rdt_lab_abstract::{ProtocolConfig, ReceiverProtocol, SenderProtocol};
use tracing::debug;

use crate::alternating::{AltBitReceiver, AltBitSender};
use crate::gbn::{GbnReceiver, GbnSender};
use crate::lifecycle::{ConnectedReceiver, ConnectedSender};
use crate::naive::{NaiveReceiver, NaiveSender};

/// Built-in protocol families. The concrete pair is chosen once, at
/// construction time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolKind {
    Naive,
    AlternatingBit,
    GoBackN,
    /// Go-Back-N behind a SYN/FIN handshake.
    Connected,
}

impl ProtocolKind {
    /// Map a user-visible name to a protocol family.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "naive" => Ok(Self::Naive),
            "abp" | "alternating-bit" | "stop-and-wait" => Ok(Self::AlternatingBit),
            "gbn" | "go-back-n" => Ok(Self::GoBackN),
            "connected" | "gbn-connected" => Ok(Self::Connected),
            other => anyhow::bail!(
                "Unknown protocol '{other}'. Try 'naive', 'abp', 'gbn' or 'connected'."
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::AlternatingBit => "abp",
            Self::GoBackN => "gbn",
            Self::Connected => "connected",
        }
    }
}

pub type ProtocolPair = (Box<dyn SenderProtocol>, Box<dyn ReceiverProtocol>);

/// Build a sender/receiver pair of the given family.
pub fn build_pair(kind: ProtocolKind, config: &ProtocolConfig) -> Result<ProtocolPair> {
    config
        .validate()
        .with_context(|| format!("invalid configuration for '{}'", kind.name()))?;
    debug!("building {} pair with {:?}", kind.name(), config);

    Ok(match kind {
        ProtocolKind::Naive => (Box::new(NaiveSender), Box::new(NaiveReceiver)),
        ProtocolKind::AlternatingBit => (
            Box::new(AltBitSender::new(config)),
            Box::new(AltBitReceiver::new()),
        ),
        ProtocolKind::GoBackN => (
            Box::new(GbnSender::new(config)),
            Box::new(GbnReceiver::new()),
        ),
        ProtocolKind::Connected => (
            Box::new(ConnectedSender::new(config)),
            Box::new(ConnectedReceiver::new(config)),
        ),
    })
}

/// Shorthand for `build_pair(ProtocolKind::from_name(name)?, config)`.
pub fn pair_by_name(name: &str, config: &ProtocolConfig) -> Result<ProtocolPair> {
    build_pair(ProtocolKind::from_name(name)?, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for kind in [
            ProtocolKind::Naive,
            ProtocolKind::AlternatingBit,
            ProtocolKind::GoBackN,
            ProtocolKind::Connected,
        ] {
            assert_eq!(ProtocolKind::from_name(kind.name()).unwrap(), kind);
        }
        assert_eq!(
            ProtocolKind::from_name("go-back-n").unwrap(),
            ProtocolKind::GoBackN
        );
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = ProtocolKind::from_name("selective-repeat").unwrap_err();
        assert!(err.to_string().contains("selective-repeat"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ProtocolConfig::default().with_window_size(0);
        assert!(build_pair(ProtocolKind::GoBackN, &config).is_err());
    }
}
