#![forbid(unsafe_code)]

//! Failure types shared across the crate.
//!
//! Stream failures are typed per publisher (`Publisher::Failure`). A
//! publisher that cannot fail uses [`Never`]. Contract breaches between a
//! producer and a subscriber are described by [`ProtocolViolation`]; the
//! delivery engine never produces them, and test subscribers record them
//! when a producer misbehaves.

use std::fmt;

use crate::demand::Demand;

/// Failure type of a stream that cannot fail.
pub type Never = std::convert::Infallible;

/// A breach of the subscribe/request/deliver contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A second subscription was handed to the same subscriber.
    DuplicateSubscription,
    /// A value arrived before the subscription handoff.
    ValueBeforeSubscription,
    /// A value arrived after the terminal signal.
    ValueAfterTerminal {
        /// 1-based position of the offending value.
        index: u64,
    },
    /// A value arrived after the subscriber cancelled.
    ValueAfterCancel {
        /// 1-based position of the offending value.
        index: u64,
    },
    /// More values were delivered than the subscriber ever requested.
    DemandExceeded {
        /// Values delivered so far, including the offending one.
        delivered: u64,
        /// Cumulative demand granted so far.
        granted: Demand,
    },
    /// A second terminal signal arrived.
    DuplicateTerminal,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSubscription => f.write_str("subscription received twice"),
            Self::ValueBeforeSubscription => f.write_str("value delivered before subscription"),
            Self::ValueAfterTerminal { index } => {
                write!(f, "value #{index} delivered after terminal signal")
            }
            Self::ValueAfterCancel { index } => {
                write!(f, "value #{index} delivered after cancel")
            }
            Self::DemandExceeded { delivered, granted } => {
                write!(f, "{delivered} values delivered but only {granted} requested")
            }
            Self::DuplicateTerminal => f.write_str("terminal signal delivered twice"),
        }
    }
}

impl std::error::Error for ProtocolViolation {}
