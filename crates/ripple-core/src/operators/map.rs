#![forbid(unsafe_code)]

//! Value and failure transformations: `map`, `try_map`, `map_error`,
//! `set_failure_type`.
//!
//! All four pass the upstream subscription straight through, so demand
//! flows unchanged in both directions.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::demand::Demand;
use crate::error::Never;
use crate::publisher::Publisher;
use crate::subscriber::{Completion, Subscriber};
use crate::subscription::SubscriptionHandle;

/// Publisher returned by [`PublisherExt::map`](crate::PublisherExt::map).
pub struct Map<P, F> {
    upstream: P,
    transform: Arc<F>,
}

impl<P, F> Map<P, F> {
    pub(crate) fn new(upstream: P, transform: F) -> Self {
        Self {
            upstream,
            transform: Arc::new(transform),
        }
    }
}

impl<P, F, U> Publisher for Map<P, F>
where
    P: Publisher,
    F: Fn(P::Output) -> U + Send + Sync + 'static,
    U: Send + 'static,
{
    type Output = U;
    type Failure = P::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U, Failure = P::Failure>,
    {
        self.upstream.subscribe(MapSubscriber {
            downstream: subscriber,
            transform: Arc::clone(&self.transform),
            _input: PhantomData,
        });
    }
}

struct MapSubscriber<S, F, T> {
    downstream: S,
    transform: Arc<F>,
    _input: PhantomData<fn(T)>,
}

impl<S, F, T> Subscriber for MapSubscriber<S, F, T>
where
    S: Subscriber,
    F: Fn(T) -> S::Input + Send + Sync + 'static,
    T: Send + 'static,
{
    type Input = T;
    type Failure = S::Failure;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&mut self, input: T) -> Demand {
        self.downstream.receive((self.transform)(input))
    }

    fn receive_completion(&mut self, completion: Completion<S::Failure>) {
        self.downstream.receive_completion(completion);
    }
}

/// Publisher returned by [`PublisherExt::try_map`](crate::PublisherExt::try_map).
pub struct TryMap<P, F> {
    upstream: P,
    transform: Arc<F>,
}

impl<P, F> TryMap<P, F> {
    pub(crate) fn new(upstream: P, transform: F) -> Self {
        Self {
            upstream,
            transform: Arc::new(transform),
        }
    }
}

impl<P, F, U, E> Publisher for TryMap<P, F>
where
    P: Publisher,
    P::Failure: Into<E>,
    F: Fn(P::Output) -> Result<U, E> + Send + Sync + 'static,
    U: Send + 'static,
    E: Send + 'static,
{
    type Output = U;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = U, Failure = E>,
    {
        self.upstream.subscribe(TryMapSubscriber {
            downstream: subscriber,
            transform: Arc::clone(&self.transform),
            upstream: None,
            done: false,
            _upstream: PhantomData,
        });
    }
}

struct TryMapSubscriber<S, F, T, E0> {
    downstream: S,
    transform: Arc<F>,
    upstream: Option<SubscriptionHandle>,
    done: bool,
    _upstream: PhantomData<fn(T, E0)>,
}

impl<S, F, T, E0> Subscriber for TryMapSubscriber<S, F, T, E0>
where
    S: Subscriber,
    F: Fn(T) -> Result<S::Input, S::Failure> + Send + Sync + 'static,
    T: Send + 'static,
    E0: Into<S::Failure> + Send + 'static,
{
    type Input = T;
    type Failure = E0;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.upstream = Some(Arc::clone(&subscription));
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&mut self, input: T) -> Demand {
        if self.done {
            return Demand::NONE;
        }
        match (self.transform)(input) {
            Ok(value) => self.downstream.receive(value),
            Err(error) => {
                self.done = true;
                if let Some(upstream) = self.upstream.take() {
                    upstream.cancel();
                }
                self.downstream.receive_completion(Completion::Failure(error));
                Demand::NONE
            }
        }
    }

    fn receive_completion(&mut self, completion: Completion<E0>) {
        if self.done {
            return;
        }
        self.done = true;
        self.upstream = None;
        self.downstream
            .receive_completion(completion.map_failure(Into::into));
    }
}

/// Publisher returned by [`PublisherExt::map_error`](crate::PublisherExt::map_error).
pub struct MapError<P, F> {
    upstream: P,
    transform: Arc<F>,
}

impl<P, F> MapError<P, F> {
    pub(crate) fn new(upstream: P, transform: F) -> Self {
        Self {
            upstream,
            transform: Arc::new(transform),
        }
    }
}

impl<P, F, E> Publisher for MapError<P, F>
where
    P: Publisher,
    F: Fn(P::Failure) -> E + Send + Sync + 'static,
    E: Send + 'static,
{
    type Output = P::Output;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = E>,
    {
        self.upstream.subscribe(MapErrorSubscriber {
            downstream: subscriber,
            transform: Arc::clone(&self.transform),
            _failure: PhantomData,
        });
    }
}

struct MapErrorSubscriber<S, F, E0> {
    downstream: S,
    transform: Arc<F>,
    _failure: PhantomData<fn(E0)>,
}

impl<S, F, E0> Subscriber for MapErrorSubscriber<S, F, E0>
where
    S: Subscriber,
    F: Fn(E0) -> S::Failure + Send + Sync + 'static,
    E0: Send + 'static,
{
    type Input = S::Input;
    type Failure = E0;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&mut self, input: S::Input) -> Demand {
        self.downstream.receive(input)
    }

    fn receive_completion(&mut self, completion: Completion<E0>) {
        let transform = &self.transform;
        self.downstream
            .receive_completion(completion.map_failure(|e| transform(e)));
    }
}

/// Publisher returned by
/// [`PublisherExt::set_failure_type`](crate::PublisherExt::set_failure_type).
pub struct SetFailureType<P, E> {
    upstream: P,
    _failure: PhantomData<fn() -> E>,
}

impl<P, E> SetFailureType<P, E> {
    pub(crate) fn new(upstream: P) -> Self {
        Self {
            upstream,
            _failure: PhantomData,
        }
    }
}

impl<P, E> Publisher for SetFailureType<P, E>
where
    P: Publisher<Failure = Never>,
    E: Send + 'static,
{
    type Output = P::Output;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = E>,
    {
        self.upstream.subscribe(SetFailureTypeSubscriber {
            downstream: subscriber,
        });
    }
}

struct SetFailureTypeSubscriber<S> {
    downstream: S,
}

impl<S: Subscriber> Subscriber for SetFailureTypeSubscriber<S> {
    type Input = S::Input;
    type Failure = Never;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&mut self, input: S::Input) -> Demand {
        self.downstream.receive(input)
    }

    fn receive_completion(&mut self, completion: Completion<Never>) {
        self.downstream
            .receive_completion(completion.map_failure(|never| match never {}));
    }
}
