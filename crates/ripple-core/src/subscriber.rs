#![forbid(unsafe_code)]

//! The subscriber contract.
//!
//! A subscriber receives, in order:
//!
//! 1. exactly one subscription ([`Subscriber::receive_subscription`]),
//! 2. zero or more values ([`Subscriber::receive`]), never more than the
//!    demand it granted,
//! 3. at most one terminal signal ([`Subscriber::receive_completion`]).
//!
//! Calls on one subscriber never overlap. The demand returned from
//! `receive` is *added* to the outstanding total, so a subscriber can top up
//! its own demand from inside the callback.

use crate::demand::Demand;
use crate::subscription::SubscriptionHandle;

/// Terminal signal of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<E> {
    /// The stream ended normally.
    Finished,
    /// The stream ended with an error.
    Failure(E),
}

impl<E> Completion<E> {
    /// True for [`Completion::Failure`].
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Borrow the failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Finished => None,
            Self::Failure(e) => Some(e),
        }
    }

    /// Rewrite the failure, leaving `Finished` untouched.
    pub fn map_failure<F>(self, f: impl FnOnce(E) -> F) -> Completion<F> {
        match self {
            Self::Finished => Completion::Finished,
            Self::Failure(e) => Completion::Failure(f(e)),
        }
    }

    /// `Ok(())` for `Finished`, `Err(e)` for a failure.
    pub fn into_result(self) -> Result<(), E> {
        match self {
            Self::Finished => Ok(()),
            Self::Failure(e) => Err(e),
        }
    }
}

/// A sink for one stream.
pub trait Subscriber: Send + 'static {
    /// Value type accepted.
    type Input: Send + 'static;
    /// Failure type accepted.
    type Failure: Send + 'static;

    /// Called once, before any value. Nothing is delivered until the
    /// subscriber requests demand through `subscription`.
    fn receive_subscription(&mut self, subscription: SubscriptionHandle);

    /// Called once per value. The returned demand is added to the
    /// outstanding total.
    fn receive(&mut self, input: Self::Input) -> Demand;

    /// Called at most once; nothing follows it.
    fn receive_completion(&mut self, completion: Completion<Self::Failure>);
}

/// Type-erased subscriber.
pub type BoxSubscriber<T, E> = Box<dyn Subscriber<Input = T, Failure = E>>;

impl<T, E> Subscriber for BoxSubscriber<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Input = T;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        (**self).receive_subscription(subscription);
    }

    fn receive(&mut self, input: T) -> Demand {
        (**self).receive(input)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        (**self).receive_completion(completion);
    }
}
