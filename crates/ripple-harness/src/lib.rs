#![forbid(unsafe_code)]

//! Harness: contract-checking subscribers and transcript fixtures.
//!
//! # Role in Ripple
//! `ripple-harness` is the test layer. It drives any `ripple-core` publisher
//! with a [`TestSubscriber`] whose demand the test controls, records every
//! event, and reports breaches of the subscriber contract as
//! [`ProtocolViolation`](ripple_core::ProtocolViolation)s.

pub mod logging;
pub mod probe;
pub mod transcript;

pub use logging::init_test_logging;
pub use probe::{Probe, ProbeEvent, TestSubscriber};
pub use transcript::to_jsonl;
