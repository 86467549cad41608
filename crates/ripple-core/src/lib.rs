#![forbid(unsafe_code)]

//! Core: demand-driven publisher/subscriber streams.
//!
//! # Role in Ripple
//! `ripple-core` is the stream kernel. It owns the producer/subscriber
//! contract, demand accounting, the multicast hub, and the operator set.
//! `ripple-harness` checks streams against the contract and `ripple-demo`
//! builds a small application on top.
//!
//! # Primary responsibilities
//! - **Protocol**: [`Publisher`], [`Subscriber`], [`Subscription`] and
//!   additive [`Demand`].
//! - **Sources and subjects**: cold ([`Just`], [`Sequence`], [`Deferred`], ..)
//!   and hot ([`PassthroughSubject`], [`CurrentValueSubject`]).
//! - **Sharing**: [`Share`] and [`Multicast`], which forward the smallest
//!   positive downstream demand upstream.
//! - **Operators**: map, try_map, map_error, replace_error, debounce,
//!   merge, remove_duplicates, handle_events.
//! - **Lifetimes**: [`AnyCancellable`] and [`CancelBag`] scope
//!   subscriptions to their owner.
//!
//! # Control flow
//! A subscriber subscribes; the publisher hands it a subscription; the
//! subscriber requests demand; values flow while demand is positive and each
//! value's returned demand is added to what is left; a terminal signal ends
//! the relationship.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod demand;
pub mod error;
mod hub;
pub mod multicast;
pub mod observable;
pub mod operators;
mod outlet;
pub mod publisher;
pub mod scheduler;
mod sink;
pub mod sources;
pub mod subject;
pub mod subscriber;
pub mod subscription;

pub use demand::Demand;
pub use error::{Never, ProtocolViolation};
pub use multicast::{Connection, Multicast, Share};
pub use observable::{ChangeGuard, Observable};
pub use operators::EventHooks;
pub use publisher::{AnyPublisher, Publisher, PublisherExt};
pub use scheduler::{ManualScheduler, Scheduler, ThreadScheduler, ThreadSchedulerConfig};
pub use sources::{Deferred, Empty, Fail, Just, Promise, Sequence};
pub use subject::{CurrentValueSubject, PassthroughSubject};
pub use subscriber::{BoxSubscriber, Completion, Subscriber};
pub use subscription::{
    AnyCancellable, CancelBag, Cancellable, InertSubscription, Subscription, SubscriptionHandle,
    SubscriptionSlot,
};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
///
/// Stream state stays consistent across a panicking subscriber callback
/// because callbacks never run under a lock.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
