#![forbid(unsafe_code)]

//! `handle_events` / `log_events`: observe a stream's lifecycle without
//! changing it.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::subscriber::{Completion, Subscriber};
use crate::subscription::{Subscription, SubscriptionHandle};

type Hook<A> = Option<Box<dyn Fn(A) + Send + Sync>>;

/// Callbacks for each lifecycle event. Unset hooks cost nothing.
pub struct EventHooks<T, E> {
    subscription: Hook<()>,
    value: Option<Box<dyn Fn(&T) + Send + Sync>>,
    completion: Option<Box<dyn Fn(&Completion<E>) + Send + Sync>>,
    cancel: Hook<()>,
    request: Hook<Demand>,
}

impl<T, E> Default for EventHooks<T, E> {
    fn default() -> Self {
        Self {
            subscription: None,
            value: None,
            completion: None,
            cancel: None,
            request: None,
        }
    }
}

impl<T, E> fmt::Debug for EventHooks<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHooks")
            .field("subscription", &self.subscription.is_some())
            .field("value", &self.value.is_some())
            .field("completion", &self.completion.is_some())
            .field("cancel", &self.cancel.is_some())
            .field("request", &self.request.is_some())
            .finish()
    }
}

impl<T, E> EventHooks<T, E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_subscription(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.subscription = Some(Box::new(move |()| hook()));
        self
    }

    #[must_use]
    pub fn on_value(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.value = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_completion(mut self, hook: impl Fn(&Completion<E>) + Send + Sync + 'static) -> Self {
        self.completion = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_cancel(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.cancel = Some(Box::new(move |()| hook()));
        self
    }

    #[must_use]
    pub fn on_request(mut self, hook: impl Fn(Demand) + Send + Sync + 'static) -> Self {
        self.request = Some(Box::new(hook));
        self
    }
}

impl<T: fmt::Debug, E: fmt::Debug> EventHooks<T, E> {
    /// Hooks that emit a `debug` event per lifecycle step, tagged `label`.
    #[must_use]
    pub fn logging(label: &str) -> Self {
        let label: Arc<str> = Arc::from(label);
        let (l1, l2, l3, l4, l5) = (
            Arc::clone(&label),
            Arc::clone(&label),
            Arc::clone(&label),
            Arc::clone(&label),
            label,
        );
        Self::new()
            .on_subscription(move || debug!(stream = %l1, "receive subscription"))
            .on_value(move |value| debug!(stream = %l2, ?value, "receive value"))
            .on_completion(move |completion| debug!(stream = %l3, ?completion, "receive completion"))
            .on_cancel(move || debug!(stream = %l4, "receive cancel"))
            .on_request(move |demand| debug!(stream = %l5, %demand, "request"))
    }
}

/// Publisher returned by
/// [`PublisherExt::handle_events`](crate::PublisherExt::handle_events).
pub struct HandleEvents<P: Publisher> {
    upstream: P,
    hooks: Arc<EventHooks<P::Output, P::Failure>>,
}

impl<P: Publisher> HandleEvents<P> {
    pub(crate) fn new(upstream: P, hooks: EventHooks<P::Output, P::Failure>) -> Self {
        Self {
            upstream,
            hooks: Arc::new(hooks),
        }
    }
}

impl<P: Publisher> Publisher for HandleEvents<P> {
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = P::Failure>,
    {
        self.upstream.subscribe(HandleEventsSubscriber {
            downstream: subscriber,
            hooks: Arc::clone(&self.hooks),
        });
    }
}

struct HandleEventsSubscriber<S: Subscriber> {
    downstream: S,
    hooks: Arc<EventHooks<S::Input, S::Failure>>,
}

impl<S: Subscriber> Subscriber for HandleEventsSubscriber<S> {
    type Input = S::Input;
    type Failure = S::Failure;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        if let Some(hook) = &self.hooks.subscription {
            hook(());
        }
        let tapped: SubscriptionHandle = Arc::new(Tap {
            inner: subscription,
            hooks: Arc::clone(&self.hooks),
        });
        self.downstream.receive_subscription(tapped);
    }

    fn receive(&mut self, input: S::Input) -> Demand {
        if let Some(hook) = &self.hooks.value {
            hook(&input);
        }
        let more = self.downstream.receive(input);
        if !more.is_none()
            && let Some(hook) = &self.hooks.request
        {
            hook(more);
        }
        more
    }

    fn receive_completion(&mut self, completion: Completion<S::Failure>) {
        if let Some(hook) = &self.hooks.completion {
            hook(&completion);
        }
        self.downstream.receive_completion(completion);
    }
}

struct Tap<T, E> {
    inner: SubscriptionHandle,
    hooks: Arc<EventHooks<T, E>>,
}

impl<T, E> Subscription for Tap<T, E> {
    fn request(&self, demand: Demand) {
        if let Some(hook) = &self.hooks.request {
            hook(demand);
        }
        self.inner.request(demand);
    }

    fn cancel(&self) {
        if let Some(hook) = &self.hooks.cancel {
            hook(());
        }
        self.inner.cancel();
    }
}
