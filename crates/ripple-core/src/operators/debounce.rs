#![forbid(unsafe_code)]

//! `debounce`: emit a value only after a quiet period.
//!
//! Every upstream value replaces the pending one and starts a new timer.
//! The pending timer is an explicit `generation` number rather than a
//! captured closure: a timer whose generation is stale when it fires does
//! nothing. Cancelling bumps the generation, so no timer can emit after
//! cancel.
//!
//! # Invariants
//!
//! 1. At most one value is pending at any time.
//! 2. A value is emitted only once `interval` has passed with no newer
//!    value, and only into positive downstream demand. A value that comes
//!    due while the downstream has no demand waits for the next request.
//! 3. Normal completion flushes the pending value first; failure drops it.

use std::sync::{Arc, Mutex, Weak};

use tracing::trace;
use web_time::Duration;

use crate::demand::Demand;
use crate::lock;
use crate::outlet::{Link, Outlet};
use crate::publisher::Publisher;
use crate::scheduler::Scheduler;
use crate::subscriber::{Completion, Subscriber};
use crate::subscription::SubscriptionHandle;

/// Publisher returned by [`PublisherExt::debounce`](crate::PublisherExt::debounce).
pub struct Debounce<P> {
    upstream: P,
    interval: Duration,
    scheduler: Arc<dyn Scheduler>,
}

impl<P> Debounce<P> {
    pub(crate) fn new(upstream: P, interval: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            upstream,
            interval,
            scheduler,
        }
    }
}

impl<P: Publisher> Publisher for Debounce<P> {
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = P::Failure>,
    {
        let shared = Arc::new_cyclic(|weak: &Weak<DebounceShared<S>>| {
            let link: Arc<dyn Link> = Arc::new(DebounceLink { shared: weak.clone() });
            DebounceShared {
                outlet: Outlet::with_link(subscriber, link),
                state: Mutex::new(DebounceState {
                    pending: None,
                    generation: 0,
                    due: false,
                    upstream: None,
                    cancelled: false,
                }),
                interval: self.interval,
                scheduler: Arc::clone(&self.scheduler),
            }
        });
        shared.outlet.start_self();
        self.upstream.subscribe(DebounceInlet { shared });
    }
}

struct DebounceState<T> {
    pending: Option<T>,
    /// Identifies the newest timer; older timers are stale.
    generation: u64,
    /// The pending value's timer fired while the downstream had no demand.
    due: bool,
    upstream: Option<SubscriptionHandle>,
    cancelled: bool,
}

struct DebounceShared<S: Subscriber> {
    outlet: Arc<Outlet<S>>,
    state: Mutex<DebounceState<S::Input>>,
    interval: Duration,
    scheduler: Arc<dyn Scheduler>,
}

impl<S: Subscriber> DebounceShared<S> {
    fn fire(&self, generation: u64) {
        let value = {
            let mut state = lock(&self.state);
            if state.generation != generation || state.pending.is_none() {
                return;
            }
            if self.outlet.outstanding().is_none() {
                trace!(generation, "debounced value due; waiting for demand");
                state.due = true;
                return;
            }
            state.due = false;
            state.pending.take()
        };
        if let Some(value) = value {
            self.outlet.offer(value);
        }
    }
}

struct DebounceLink<S: Subscriber> {
    shared: Weak<DebounceShared<S>>,
}

impl<S: Subscriber> Link for DebounceLink<S> {
    fn on_demand(&self, _demand: Demand) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let generation = {
            let state = lock(&shared.state);
            if !state.due {
                return;
            }
            state.generation
        };
        shared.fire(generation);
    }

    fn on_cancel(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let upstream = {
            let mut state = lock(&shared.state);
            state.cancelled = true;
            state.generation += 1;
            state.pending = None;
            state.upstream.take()
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}

struct DebounceInlet<S: Subscriber> {
    shared: Arc<DebounceShared<S>>,
}

impl<S: Subscriber> Subscriber for DebounceInlet<S> {
    type Input = S::Input;
    type Failure = S::Failure;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        {
            let mut state = lock(&self.shared.state);
            if !state.cancelled {
                state.upstream = Some(Arc::clone(&subscription));
            }
        }
        if self.shared.outlet.is_closed() {
            subscription.cancel();
        } else {
            subscription.request(Demand::UNBOUNDED);
        }
    }

    fn receive(&mut self, input: S::Input) -> Demand {
        let generation = {
            let mut state = lock(&self.shared.state);
            if state.cancelled {
                return Demand::NONE;
            }
            state.generation += 1;
            state.pending = Some(input);
            state.due = false;
            state.generation
        };
        let shared = Arc::downgrade(&self.shared);
        self.shared.scheduler.schedule_after(
            self.shared.interval,
            Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.fire(generation);
                }
            }),
        );
        Demand::NONE
    }

    fn receive_completion(&mut self, completion: Completion<S::Failure>) {
        let pending = {
            let mut state = lock(&self.shared.state);
            state.generation += 1;
            state.upstream = None;
            state.due = false;
            state.pending.take()
        };
        if !completion.is_failure()
            && let Some(value) = pending
        {
            self.shared.outlet.enqueue(value);
        }
        self.shared.outlet.complete(completion);
    }
}
