#![forbid(unsafe_code)]

//! Closure-based terminal subscriber behind `sink`, `sink_values` and
//! `assign`.

use std::marker::PhantomData;

use crate::demand::Demand;
use crate::subscriber::{Completion, Subscriber};
use crate::subscription::{SubscriptionHandle, SubscriptionSlot};

/// Requests unbounded demand and hands every event to a closure.
pub(crate) struct Sink<T, E, V, C> {
    on_value: V,
    on_completion: C,
    slot: SubscriptionSlot,
    _types: PhantomData<fn(T, E)>,
}

impl<T, E, V, C> Sink<T, E, V, C> {
    pub(crate) fn new(on_value: V, on_completion: C, slot: SubscriptionSlot) -> Self {
        Self {
            on_value,
            on_completion,
            slot,
            _types: PhantomData,
        }
    }
}

impl<T, E, V, C> Subscriber for Sink<T, E, V, C>
where
    T: Send + 'static,
    E: Send + 'static,
    V: FnMut(T) + Send + 'static,
    C: FnMut(Completion<E>) + Send + 'static,
{
    type Input = T;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        if self.slot.set(std::sync::Arc::clone(&subscription)) {
            subscription.request(Demand::UNBOUNDED);
        }
    }

    fn receive(&mut self, input: T) -> Demand {
        (self.on_value)(input);
        Demand::NONE
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        self.slot.release();
        (self.on_completion)(completion);
    }
}
