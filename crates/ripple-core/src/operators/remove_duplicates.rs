#![forbid(unsafe_code)]

//! `remove_duplicates`: drop a value equal to the last one emitted.
//!
//! A suppressed value consumed one unit of upstream demand without reaching
//! the downstream, so the operator asks upstream for one more in its place.

use crate::demand::Demand;
use crate::publisher::Publisher;
use crate::subscriber::{Completion, Subscriber};
use crate::subscription::SubscriptionHandle;

/// Publisher returned by
/// [`PublisherExt::remove_duplicates`](crate::PublisherExt::remove_duplicates).
pub struct RemoveDuplicates<P> {
    upstream: P,
}

impl<P> RemoveDuplicates<P> {
    pub(crate) fn new(upstream: P) -> Self {
        Self { upstream }
    }
}

impl<P> Publisher for RemoveDuplicates<P>
where
    P: Publisher,
    P::Output: Clone + PartialEq,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = P::Failure>,
    {
        self.upstream.subscribe(RemoveDuplicatesSubscriber {
            downstream: subscriber,
            last: None,
        });
    }
}

struct RemoveDuplicatesSubscriber<S: Subscriber> {
    downstream: S,
    last: Option<S::Input>,
}

impl<S> Subscriber for RemoveDuplicatesSubscriber<S>
where
    S: Subscriber,
    S::Input: Clone + PartialEq,
{
    type Input = S::Input;
    type Failure = S::Failure;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.downstream.receive_subscription(subscription);
    }

    fn receive(&mut self, input: S::Input) -> Demand {
        if self.last.as_ref() == Some(&input) {
            return Demand::max(1);
        }
        self.last = Some(input.clone());
        self.downstream.receive(input)
    }

    fn receive_completion(&mut self, completion: Completion<S::Failure>) {
        self.last = None;
        self.downstream.receive_completion(completion);
    }
}
