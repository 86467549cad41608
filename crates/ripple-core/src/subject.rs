#![forbid(unsafe_code)]

//! Subjects: hot publishers that imperative code pushes values into.
//!
//! A subject never buffers for a subscriber that has not asked. A value sent
//! while a subscriber's demand is zero is simply not delivered to that
//! subscriber.

use std::fmt;
use std::sync::Arc;

use crate::hub::Hub;
use crate::publisher::Publisher;
use crate::subscriber::{Completion, Subscriber};

/// Relays every sent value to the subscribers attached at that moment.
pub struct PassthroughSubject<T, E> {
    pub(crate) hub: Arc<Hub<T, E>>,
}

impl<T, E> PassthroughSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self { hub: Hub::new(None) }
    }

    /// Deliver `value` to every attached subscriber with outstanding demand.
    pub fn send(&self, value: T) {
        self.hub.send(value);
    }

    /// End the stream for current and future subscribers.
    pub fn send_completion(&self, completion: Completion<E>) {
        self.hub.send_completion(completion);
    }

    /// Number of attached subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.hub.downstream_count()
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.hub.is_terminated()
    }
}

impl<T, E> Default for PassthroughSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for PassthroughSubject<T, E> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<T, E> fmt::Debug for PassthroughSubject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassthroughSubject").finish_non_exhaustive()
    }
}

impl<T, E> Publisher for PassthroughSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = E>,
    {
        self.hub.attach(subscriber);
    }
}

/// A subject that remembers its latest value and hands it to each new
/// subscriber before anything else.
pub struct CurrentValueSubject<T, E> {
    hub: Arc<Hub<T, E>>,
}

impl<T, E> CurrentValueSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new(initial: T) -> Self {
        Self {
            hub: Hub::new(Some(initial)),
        }
    }

    /// The latest value.
    #[must_use]
    pub fn value(&self) -> T {
        match self.hub.current() {
            Some(value) => value,
            None => unreachable!("current value hub always holds a value"),
        }
    }

    /// Replace the current value and deliver it to subscribers with demand.
    pub fn send(&self, value: T) {
        if self.hub.is_terminated() {
            self.hub.set_current(value);
        } else {
            self.hub.send(value);
        }
    }

    pub fn send_completion(&self, completion: Completion<E>) {
        self.hub.send_completion(completion);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.hub.downstream_count()
    }
}

impl<T, E> Clone for CurrentValueSubject<T, E> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
        }
    }
}

impl<T: fmt::Debug + Clone + Send + 'static, E: Clone + Send + 'static> fmt::Debug
    for CurrentValueSubject<T, E>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentValueSubject")
            .field("value", &self.hub.current())
            .finish_non_exhaustive()
    }
}

impl<T, E> Publisher for CurrentValueSubject<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = E>,
    {
        self.hub.attach(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Never;
    use crate::lock;
    use crate::publisher::PublisherExt;
    use std::sync::Mutex;

    #[test]
    fn passthrough_relays_to_every_subscriber() {
        let subject = PassthroughSubject::<&str, Never>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (Arc::clone(&seen), Arc::clone(&seen));
        let _first = subject.clone().sink_values(move |v| lock(&a).push(format!("1:{v}")));
        let _second = subject.clone().sink_values(move |v| lock(&b).push(format!("2:{v}")));
        assert_eq!(subject.subscriber_count(), 2);
        subject.send("hello");
        assert_eq!(*lock(&seen), vec!["1:hello", "2:hello"]);
    }

    #[test]
    fn passthrough_has_no_replay() {
        let subject = PassthroughSubject::<i32, Never>::new();
        subject.send(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _guard = subject.clone().sink_values(move |v| lock(&s).push(v));
        subject.send(2);
        assert_eq!(*lock(&seen), vec![2]);
    }

    #[test]
    fn dropping_the_guard_detaches() {
        let subject = PassthroughSubject::<i32, Never>::new();
        let guard = subject.clone().sink_values(|_| {});
        assert_eq!(subject.subscriber_count(), 1);
        drop(guard);
        assert_eq!(subject.subscriber_count(), 0);
    }

    #[test]
    fn current_value_subject_replays_latest() {
        let subject = CurrentValueSubject::<i32, Never>::new(1);
        subject.send(2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _guard = subject.clone().sink_values(move |v| lock(&s).push(v));
        subject.send(3);
        assert_eq!(*lock(&seen), vec![2, 3]);
        assert_eq!(subject.value(), 3);
    }

    #[test]
    fn completion_reaches_late_subscribers() {
        let subject = PassthroughSubject::<i32, &'static str>::new();
        subject.send_completion(Completion::Failure("closed"));
        let done = Arc::new(Mutex::new(None));
        let d = Arc::clone(&done);
        let _guard = subject.clone().sink(|_| {}, move |c| *lock(&d) = Some(c));
        assert_eq!(*lock(&done), Some(Completion::Failure("closed")));
        assert!(subject.is_terminated());
    }
}
