#![forbid(unsafe_code)]

//! The publisher trait, its type-erased form, and the operator surface.
//!
//! A [`Publisher`] is a description of a stream. `subscribe` starts one run
//! of it for one subscriber (cold publishers) or attaches the subscriber to a
//! run that is already shared (subjects, `share`, `multicast`). Operators
//! are publishers wrapping an upstream publisher; they are composed with the
//! methods of [`PublisherExt`].

use std::fmt;
use std::sync::Arc;

use web_time::Duration;

use crate::error::Never;
use crate::multicast::{Multicast, Share};
use crate::observable::Observable;
use crate::operators::{
    Debounce, EventHooks, HandleEvents, Map, MapError, Merge, RemoveDuplicates, ReplaceError,
    SetFailureType, TryMap,
};
use crate::scheduler::Scheduler;
use crate::sink::Sink;
use crate::subject::PassthroughSubject;
use crate::subscriber::{BoxSubscriber, Completion, Subscriber};
use crate::subscription::{AnyCancellable, SubscriptionSlot};

/// A source of values terminated by completion or failure.
pub trait Publisher: Send + Sync + 'static {
    /// Value type produced.
    type Output: Send + 'static;
    /// Failure type produced; [`Never`] when the stream cannot fail.
    type Failure: Send + 'static;

    /// Attach `subscriber`. The subscriber receives its subscription before
    /// anything else.
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Self::Output, Failure = Self::Failure>;
}

trait DynPublisher<T, E>: Send + Sync {
    fn subscribe_boxed(&self, subscriber: BoxSubscriber<T, E>);
}

impl<P: Publisher> DynPublisher<P::Output, P::Failure> for P {
    fn subscribe_boxed(&self, subscriber: BoxSubscriber<P::Output, P::Failure>) {
        self.subscribe(subscriber);
    }
}

/// Type-erased publisher.
pub struct AnyPublisher<T, E> {
    inner: Arc<dyn DynPublisher<T, E>>,
}

impl<T, E> AnyPublisher<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<P>(publisher: P) -> Self
    where
        P: Publisher<Output = T, Failure = E>,
    {
        Self {
            inner: Arc::new(publisher),
        }
    }
}

impl<T, E> Clone for AnyPublisher<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> fmt::Debug for AnyPublisher<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyPublisher").finish_non_exhaustive()
    }
}

impl<T, E> Publisher for AnyPublisher<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = E>,
    {
        self.inner.subscribe_boxed(Box::new(subscriber));
    }
}

/// Operator and terminal-subscriber combinators for every publisher.
pub trait PublisherExt: Publisher + Sized {
    /// Transform each value.
    fn map<U, F>(self, transform: F) -> Map<Self, F>
    where
        F: Fn(Self::Output) -> U + Send + Sync + 'static,
        U: Send + 'static,
    {
        Map::new(self, transform)
    }

    /// Transform each value with a fallible function. The first error
    /// becomes the stream's failure and cancels upstream.
    fn try_map<U, E, F>(self, transform: F) -> TryMap<Self, F>
    where
        F: Fn(Self::Output) -> Result<U, E> + Send + Sync + 'static,
        Self::Failure: Into<E>,
        U: Send + 'static,
        E: Send + 'static,
    {
        TryMap::new(self, transform)
    }

    /// Rewrite the failure type.
    fn map_error<E, F>(self, transform: F) -> MapError<Self, F>
    where
        F: Fn(Self::Failure) -> E + Send + Sync + 'static,
        E: Send + 'static,
    {
        MapError::new(self, transform)
    }

    /// Give a stream that cannot fail any failure type.
    fn set_failure_type<E>(self) -> SetFailureType<Self, E>
    where
        Self: Publisher<Failure = Never>,
        E: Send + 'static,
    {
        SetFailureType::new(self)
    }

    /// Replace a failure with `fallback` followed by normal completion.
    fn replace_error(self, fallback: Self::Output) -> ReplaceError<Self>
    where
        Self::Output: Clone + Sync,
    {
        ReplaceError::new(self, fallback)
    }

    /// Suppress values equal to the previously emitted one.
    fn remove_duplicates(self) -> RemoveDuplicates<Self>
    where
        Self::Output: Clone + PartialEq,
    {
        RemoveDuplicates::new(self)
    }

    /// Observe lifecycle events without altering the stream.
    fn handle_events(self, hooks: EventHooks<Self::Output, Self::Failure>) -> HandleEvents<Self> {
        HandleEvents::new(self, hooks)
    }

    /// Log every lifecycle event through `tracing`, tagged with `label`.
    fn log_events(self, label: &str) -> HandleEvents<Self>
    where
        Self::Output: fmt::Debug,
        Self::Failure: fmt::Debug,
    {
        HandleEvents::new(self, EventHooks::logging(label))
    }

    /// Emit a value only after `interval` passes without a newer one.
    fn debounce(self, interval: Duration, scheduler: Arc<dyn Scheduler>) -> Debounce<Self> {
        Debounce::new(self, interval, scheduler)
    }

    /// Interleave with `other` in arrival order.
    fn merge<P>(self, other: P) -> Merge<Self, P>
    where
        P: Publisher<Output = Self::Output, Failure = Self::Failure>,
    {
        Merge::new(self, other)
    }

    /// Share one upstream run among all subscribers, connecting on the
    /// first subscription. Late subscribers see only later values.
    fn share(self) -> Share<Self>
    where
        Self::Output: Clone,
        Self::Failure: Clone,
    {
        Share::new(self)
    }

    /// Relay through `subject`; upstream starts only on
    /// [`Multicast::connect`].
    fn multicast(self, subject: PassthroughSubject<Self::Output, Self::Failure>) -> Multicast<Self>
    where
        Self::Output: Clone,
        Self::Failure: Clone,
    {
        Multicast::new(self, subject)
    }

    /// Subscribe with closures and unbounded demand.
    fn sink<V, C>(self, on_value: V, on_completion: C) -> AnyCancellable
    where
        V: FnMut(Self::Output) + Send + 'static,
        C: FnMut(Completion<Self::Failure>) + Send + 'static,
    {
        let slot = SubscriptionSlot::new();
        self.subscribe(Sink::new(on_value, on_completion, slot.clone()));
        AnyCancellable::from_slot(slot)
    }

    /// Subscribe to a stream that cannot fail.
    fn sink_values<V>(self, on_value: V) -> AnyCancellable
    where
        Self: Publisher<Failure = Never>,
        V: FnMut(Self::Output) + Send + 'static,
    {
        self.sink(on_value, |_| {})
    }

    /// Write every value into `target`.
    fn assign(self, target: &Observable<Self::Output>) -> AnyCancellable
    where
        Self: Publisher<Failure = Never>,
        Self::Output: Clone + PartialEq + Sync,
    {
        let target = target.clone();
        self.sink_values(move |value| target.set(value))
    }

    /// Erase the publisher's concrete type.
    fn boxed(self) -> AnyPublisher<Self::Output, Self::Failure> {
        AnyPublisher::new(self)
    }
}

impl<P: Publisher> PublisherExt for P {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock;
    use crate::sources::{Fail, Just, Sequence};
    use std::sync::Mutex;

    #[test]
    fn boxed_publisher_delivers() {
        let erased: AnyPublisher<i32, Never> = Sequence::new(vec![1, 2, 3]).boxed();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _guard = erased.clone().sink_values(move |v| lock(&s).push(v));
        assert_eq!(*lock(&seen), vec![1, 2, 3]);
    }

    #[test]
    fn sink_reports_completion() {
        let done = Arc::new(Mutex::new(None));
        let d = Arc::clone(&done);
        let _guard = Fail::<i32, &str>::new("bad").sink(|_| {}, move |c| *lock(&d) = Some(c));
        assert_eq!(*lock(&done), Some(Completion::Failure("bad")));
    }

    #[test]
    fn assign_writes_into_observable() {
        let target = Observable::new(0);
        let _guard = Just::new(41).map(|v| v + 1).assign(&target);
        assert_eq!(target.get(), 42);
    }
}
