#![forbid(unsafe_code)]

//! Operators composed through [`PublisherExt`](crate::PublisherExt).
//!
//! Pass-through operators (`map`, `try_map`, `map_error`,
//! `set_failure_type`, `remove_duplicates`, `handle_events`) wrap the
//! subscriber and hand it the upstream subscription unchanged. Relaying
//! operators (`replace_error`, `debounce`, `merge`) own an outlet of their
//! own and decide what to ask upstream for.

mod debounce;
mod handle_events;
mod map;
mod merge;
mod remove_duplicates;
mod replace_error;

pub use debounce::Debounce;
pub use handle_events::{EventHooks, HandleEvents};
pub use map::{Map, MapError, SetFailureType, TryMap};
pub use merge::Merge;
pub use remove_duplicates::RemoveDuplicates;
pub use replace_error::ReplaceError;
