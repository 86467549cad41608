#![forbid(unsafe_code)]

//! Ripple demo library.
//!
//! Exposes the scenario runner and the checkout view-model so integration
//! tests can drive them without the binary.
//!
//! # Role in Ripple
//! `ripple-demo` is the consumer side of `ripple-core`: a fetch/decode
//! collaborator that wraps one request/response exchange as a
//! one-value-then-complete publisher, an exchange-rate service built on it,
//! and a view-model that exposes derived streams as readable state.
//!
//! # How it fits in the system
//! Each [`scenarios::Scenario`] returns a transcript of what its subscribers
//! saw, so the binary prints it and the tests compare it.

pub mod checkout;
pub mod cli;
pub mod config;
pub mod currency;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod scenarios;

pub use checkout::{CheckoutInfo, CheckoutViewModel, ShippingOption};
pub use config::DemoConfig;
pub use currency::{Currency, CurrencyService, Quote};
pub use error::{DecodeError, FetchError, ServiceError};
pub use fetch::{Fetcher, MockFetcher, Request};
pub use scenarios::Scenario;
