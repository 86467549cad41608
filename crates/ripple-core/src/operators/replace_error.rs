#![forbid(unsafe_code)]

//! `replace_error`: turn a failure into one fallback value plus normal
//! completion.
//!
//! The fallback is held until the downstream has demand for it; the
//! completion follows it.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::demand::Demand;
use crate::error::Never;
use crate::outlet::{ForwardLink, Link, Outlet};
use crate::publisher::Publisher;
use crate::subscriber::{Completion, Subscriber};
use crate::subscription::SubscriptionHandle;

/// Publisher returned by
/// [`PublisherExt::replace_error`](crate::PublisherExt::replace_error).
pub struct ReplaceError<P: Publisher> {
    upstream: P,
    fallback: P::Output,
}

impl<P: Publisher> ReplaceError<P> {
    pub(crate) fn new(upstream: P, fallback: P::Output) -> Self {
        Self { upstream, fallback }
    }
}

impl<P> Publisher for ReplaceError<P>
where
    P: Publisher,
    P::Output: Clone + Sync,
{
    type Output = P::Output;
    type Failure = Never;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = Never>,
    {
        let link = Arc::new(ForwardLink::default());
        let outlet = Outlet::with_link(subscriber, Arc::clone(&link) as Arc<dyn Link>);
        outlet.start_self();
        self.upstream.subscribe(ReplaceErrorInlet {
            outlet,
            link,
            fallback: Some(self.fallback.clone()),
            _failure: PhantomData::<fn(P::Failure)>,
        });
    }
}

struct ReplaceErrorInlet<S: Subscriber, E> {
    outlet: Arc<Outlet<S>>,
    link: Arc<ForwardLink>,
    fallback: Option<S::Input>,
    _failure: PhantomData<fn(E)>,
}

impl<S, E> Subscriber for ReplaceErrorInlet<S, E>
where
    S: Subscriber<Failure = Never>,
    E: Send + 'static,
{
    type Input = S::Input;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        if self.outlet.is_closed() {
            subscription.cancel();
            return;
        }
        // Demand asked for before upstream arrived was recorded by the
        // outlet but had nowhere to go.
        if self.link.upstream.set(Arc::clone(&subscription)) {
            let early = self.outlet.outstanding();
            if !early.is_none() {
                subscription.request(early);
            }
        }
    }

    fn receive(&mut self, input: S::Input) -> Demand {
        // Demand is forwarded 1:1, so the queue stays within it.
        self.outlet.enqueue(input);
        Demand::NONE
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        self.link.upstream.release();
        if completion.is_failure()
            && let Some(fallback) = self.fallback.take()
        {
            self.outlet.enqueue(fallback);
        }
        self.outlet.complete(Completion::Finished);
    }
}
