#![forbid(unsafe_code)]

//! Per-subscriber delivery engine.
//!
//! Every producer in this crate hands values to its subscriber through an
//! [`Outlet`]. The outlet owns the subscriber, the outstanding demand, a
//! queue of values that were accepted but not yet delivered, an optional
//! pull source, and at most one pending terminal signal.
//!
//! # Drain protocol
//!
//! At most one thread *drains* an outlet at a time (the `draining` flag).
//! Whoever changes the outlet's state (a request, an offered value, a
//! completion) claims the drain if nobody holds it, otherwise it leaves the
//! change for the current drainer to pick up. The subscriber is moved out of
//! the state while one of its callbacks runs, so:
//!
//! - no lock is held across a subscriber callback,
//! - a callback may call `request` or `cancel` on its own subscription (the
//!   call only records the change and returns),
//! - calls on one subscriber are strictly sequential.
//!
//! # Invariants
//!
//! 1. The handoff (`receive_subscription`) completes before any value.
//! 2. A value is delivered only while demand is positive; each delivery
//!    consumes one unit of bounded demand.
//! 3. The queue never holds more values than the outstanding demand when
//!    filled through [`Outlet::offer`].
//! 4. Once closed (cancelled or terminated) the outlet drops its subscriber
//!    and every later operation is a no-op.
//!
//! # Failure Modes
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | Value offered without demand | Rejected with [`Offer::NoDemand`] |
//! | Value offered after close | Rejected with [`Offer::Closed`], logged at trace |
//! | Second terminal signal | Ignored, logged at debug |
//! | Request after close | Ignored |

use std::collections::VecDeque;
use std::iter::Peekable;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use crate::demand::Demand;
use crate::lock;
use crate::subscriber::{Completion, Subscriber};
use crate::subscription::{Subscription, SubscriptionHandle, SubscriptionSlot};

/// Side channel from an outlet back to the operator that owns it.
///
/// Operators that relay an upstream into their own outlet (replace_error,
/// debounce, merge) learn about downstream demand and cancellation here.
/// Calls happen outside the outlet's lock.
pub(crate) trait Link: Send + Sync {
    /// Downstream demand grew by `demand` (a request or a delta returned
    /// from `receive`).
    fn on_demand(&self, demand: Demand);

    /// Downstream cancelled.
    fn on_cancel(&self);
}

/// Link that forwards demand and cancellation 1:1 to an upstream
/// subscription.
#[derive(Default)]
pub(crate) struct ForwardLink {
    pub(crate) upstream: SubscriptionSlot,
}

impl Link for ForwardLink {
    fn on_demand(&self, demand: Demand) {
        self.upstream.request(demand);
    }

    fn on_cancel(&self) {
        self.upstream.cancel();
    }
}

/// Result of [`Outlet::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Queued for delivery (possibly already delivered).
    Accepted,
    /// The subscriber has no room; the value was dropped.
    NoDemand,
    /// The outlet is cancelled or terminated; the value was dropped.
    Closed,
}

/// Object-safe view of an outlet, independent of the subscriber type.
pub(crate) trait Downstream<T, E>: Send + Sync {
    fn offer(&self, value: T) -> Offer;
    fn enqueue(&self, value: T) -> bool;
    fn complete(&self, completion: Completion<E>) -> bool;
    fn outstanding(&self) -> Demand;
    fn is_closed(&self) -> bool;
}

type Source<T> = Peekable<Box<dyn Iterator<Item = T> + Send>>;

struct OutletState<S: Subscriber> {
    subscriber: Option<S>,
    demand: Demand,
    queue: VecDeque<S::Input>,
    source: Option<Source<S::Input>>,
    terminal: Option<Completion<S::Failure>>,
    /// A producer pushed a terminal signal through `complete`.
    terminated: bool,
    draining: bool,
    closed: bool,
    delivered: u64,
}

enum Step<S: Subscriber> {
    Deliver(S, S::Input),
    Terminate(S, Completion<S::Failure>),
    Release(Option<S>),
    Idle,
}

impl<S: Subscriber> OutletState<S> {
    /// True when pushed values must be dropped. A value after the producer's
    /// own terminal signal is a contract breach; after cancel it is a race.
    fn rejects_values(&self) -> bool {
        if self.terminated {
            warn!(delivered = self.delivered, "value after terminal signal dropped");
            true
        } else if self.closed {
            trace!(delivered = self.delivered, "value dropped: outlet cancelled");
            true
        } else {
            false
        }
    }

    fn room(&self) -> Demand {
        if self.closed {
            Demand::NONE
        } else {
            self.demand.saturating_sub(self.queue.len())
        }
    }

    fn next_step(&mut self) -> Step<S> {
        if self.closed {
            self.draining = false;
            self.queue.clear();
            self.source = None;
            return Step::Release(self.subscriber.take());
        }

        if let Some(source) = self.source.as_mut()
            && source.peek().is_none()
        {
            self.source = None;
            self.terminal.get_or_insert(Completion::Finished);
        }

        if self.subscriber.is_some() && !self.demand.is_none() {
            let next = match self.queue.pop_front() {
                Some(value) => Some(value),
                None => self.source.as_mut().and_then(Iterator::next),
            };
            if let Some(value) = next
                && let Some(subscriber) = self.subscriber.take()
            {
                self.demand = self.demand.decrement();
                self.delivered += 1;
                return Step::Deliver(subscriber, value);
            }
        }

        if self.queue.is_empty()
            && self.source.is_none()
            && self.subscriber.is_some()
            && let Some(completion) = self.terminal.take()
            && let Some(subscriber) = self.subscriber.take()
        {
            self.closed = true;
            return Step::Terminate(subscriber, completion);
        }

        self.draining = false;
        Step::Idle
    }
}

/// Delivery endpoint for one subscriber.
pub(crate) struct Outlet<S: Subscriber> {
    state: Mutex<OutletState<S>>,
    link: Option<Arc<dyn Link>>,
}

impl<S: Subscriber> Outlet<S> {
    fn build(
        subscriber: S,
        source: Option<Source<S::Input>>,
        link: Option<Arc<dyn Link>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(OutletState {
                subscriber: Some(subscriber),
                demand: Demand::NONE,
                queue: VecDeque::new(),
                source,
                terminal: None,
                terminated: false,
                // Claimed until `start` finishes the handoff.
                draining: true,
                closed: false,
                delivered: 0,
            }),
            link,
        })
    }

    /// Outlet fed by pushes (`offer`, `enqueue`, `complete`).
    pub(crate) fn new(subscriber: S) -> Arc<Self> {
        Self::build(subscriber, None, None)
    }

    /// Outlet that reports demand and cancellation to `link`.
    pub(crate) fn with_link(subscriber: S, link: Arc<dyn Link>) -> Arc<Self> {
        Self::build(subscriber, None, Some(link))
    }

    /// Outlet that pulls values from `items` as demand allows and finishes
    /// when the iterator is exhausted.
    pub(crate) fn with_source<I>(subscriber: S, items: I) -> Arc<Self>
    where
        I: Iterator<Item = S::Input> + Send + 'static,
    {
        let boxed: Box<dyn Iterator<Item = S::Input> + Send> = Box::new(items);
        Self::build(subscriber, Some(boxed.peekable()), None)
    }

    /// Hand `handle` to the subscriber, then start delivering.
    ///
    /// Requests made during the handoff are recorded and served once it
    /// returns.
    pub(crate) fn start(&self, handle: SubscriptionHandle) {
        let subscriber = lock(&self.state).subscriber.take();
        if let Some(mut subscriber) = subscriber {
            subscriber.receive_subscription(handle);
            lock(&self.state).subscriber = Some(subscriber);
        }
        self.drain();
    }

    /// Convenience for producers whose outlet is also the subscription.
    pub(crate) fn start_self(self: &Arc<Self>) {
        let handle: SubscriptionHandle = Arc::clone(self) as SubscriptionHandle;
        self.start(handle);
    }

    /// Queue `value` ahead of the handoff. Only valid before [`start`](Self::start).
    pub(crate) fn preload(&self, value: S::Input) {
        lock(&self.state).queue.push_back(value);
    }

    fn pump(&self) {
        {
            let mut state = lock(&self.state);
            if state.draining || (state.closed && state.subscriber.is_none()) {
                return;
            }
            state.draining = true;
        }
        self.drain();
    }

    fn drain(&self) {
        loop {
            let step = lock(&self.state).next_step();
            match step {
                Step::Deliver(mut subscriber, value) => {
                    let more = subscriber.receive(value);
                    let forward = {
                        let mut state = lock(&self.state);
                        state.subscriber = Some(subscriber);
                        if state.closed || more.is_none() {
                            false
                        } else {
                            state.demand += more;
                            true
                        }
                    };
                    if forward && let Some(link) = &self.link {
                        link.on_demand(more);
                    }
                }
                Step::Terminate(mut subscriber, completion) => {
                    debug!(failed = completion.is_failure(), "delivering terminal signal");
                    subscriber.receive_completion(completion);
                    drop(subscriber);
                }
                Step::Release(subscriber) => {
                    drop(subscriber);
                    return;
                }
                Step::Idle => return,
            }
        }
    }

    /// Deliver `value` if the subscriber has room for it, drop it otherwise.
    pub(crate) fn offer(&self, value: S::Input) -> Offer {
        {
            let mut state = lock(&self.state);
            if state.rejects_values() {
                return Offer::Closed;
            }
            if state.room().is_none() {
                trace!(delivered = state.delivered, "value dropped: no demand");
                return Offer::NoDemand;
            }
            state.queue.push_back(value);
            debug_assert!(
                state.demand.is_unbounded()
                    || state.queue.len() <= state.demand.bounded().unwrap_or(0),
                "offer queued beyond outstanding demand"
            );
        }
        self.pump();
        Offer::Accepted
    }

    /// Queue `value` for delivery once demand allows. Callers bound the
    /// queue themselves (one-shot producers, demand-forwarding relays).
    pub(crate) fn enqueue(&self, value: S::Input) -> bool {
        {
            let mut state = lock(&self.state);
            if state.rejects_values() {
                return false;
            }
            state.queue.push_back(value);
        }
        self.pump();
        true
    }

    /// Schedule the terminal signal after any queued values. Terminal
    /// signals need no demand.
    pub(crate) fn complete(&self, completion: Completion<S::Failure>) -> bool {
        {
            let mut state = lock(&self.state);
            if state.terminated {
                warn!("duplicate terminal signal ignored");
                return false;
            }
            if state.closed {
                trace!("terminal signal dropped: outlet cancelled");
                return false;
            }
            state.source = None;
            state.terminal = Some(completion);
            state.terminated = true;
        }
        self.pump();
        true
    }

    /// Demand not yet spoken for by queued values.
    pub(crate) fn outstanding(&self) -> Demand {
        lock(&self.state).room()
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    #[cfg(test)]
    pub(crate) fn delivered(&self) -> u64 {
        lock(&self.state).delivered
    }
}

impl<S: Subscriber> Subscription for Outlet<S> {
    fn request(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.demand += demand;
        }
        if let Some(link) = &self.link {
            link.on_demand(demand);
        }
        self.pump();
    }

    fn cancel(&self) {
        {
            let mut state = lock(&self.state);
            if state.closed {
                return;
            }
            state.closed = true;
            state.queue.clear();
            state.source = None;
            state.terminal = None;
        }
        debug!("subscription cancelled");
        if let Some(link) = &self.link {
            link.on_cancel();
        }
        self.pump();
    }
}

impl<S: Subscriber> Downstream<S::Input, S::Failure> for Outlet<S> {
    fn offer(&self, value: S::Input) -> Offer {
        Outlet::offer(self, value)
    }

    fn enqueue(&self, value: S::Input) -> bool {
        Outlet::enqueue(self, value)
    }

    fn complete(&self, completion: Completion<S::Failure>) -> bool {
        Outlet::complete(self, completion)
    }

    fn outstanding(&self) -> Demand {
        Outlet::outstanding(self)
    }

    fn is_closed(&self) -> bool {
        Outlet::is_closed(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Log {
        values: Vec<i32>,
        completions: Vec<Completion<&'static str>>,
        handle: Option<SubscriptionHandle>,
    }

    /// Subscriber driven by a shared log and a per-value policy.
    struct Scripted {
        log: Arc<Mutex<Log>>,
        initial: Demand,
        policy: fn(i32) -> Demand,
    }

    impl Subscriber for Scripted {
        type Input = i32;
        type Failure = &'static str;

        fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
            lock(&self.log).handle = Some(Arc::clone(&subscription));
            subscription.request(self.initial);
        }

        fn receive(&mut self, input: i32) -> Demand {
            lock(&self.log).values.push(input);
            (self.policy)(input)
        }

        fn receive_completion(&mut self, completion: Completion<&'static str>) {
            lock(&self.log).completions.push(completion);
        }
    }

    fn scripted(initial: Demand, policy: fn(i32) -> Demand) -> (Scripted, Arc<Mutex<Log>>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let sub = Scripted {
            log: Arc::clone(&log),
            initial,
            policy,
        };
        (sub, log)
    }

    fn handle(log: &Arc<Mutex<Log>>) -> SubscriptionHandle {
        lock(log).handle.clone().expect("handoff happened")
    }

    #[test]
    fn source_respects_initial_demand() {
        let (sub, log) = scripted(Demand::max(2), |_| Demand::NONE);
        let outlet = Outlet::with_source(sub, 1..=5);
        outlet.start_self();
        assert_eq!(lock(&log).values, vec![1, 2]);
        assert!(lock(&log).completions.is_empty());
        assert_eq!(outlet.delivered(), 2);
    }

    #[test]
    fn source_resumes_on_request_and_finishes() {
        let (sub, log) = scripted(Demand::max(1), |_| Demand::NONE);
        let outlet = Outlet::with_source(sub, 1..=3);
        outlet.start_self();
        handle(&log).request(Demand::max(5));
        assert_eq!(lock(&log).values, vec![1, 2, 3]);
        assert_eq!(lock(&log).completions, vec![Completion::Finished]);
        assert!(outlet.is_closed());
    }

    #[test]
    fn empty_source_finishes_without_demand() {
        let (sub, log) = scripted(Demand::NONE, |_| Demand::NONE);
        let outlet = Outlet::with_source(sub, std::iter::empty());
        outlet.start_self();
        assert_eq!(lock(&log).completions, vec![Completion::Finished]);
    }

    #[test]
    fn returned_demand_is_additive() {
        let (sub, log) = scripted(Demand::max(2), |v| match v {
            1 => Demand::max(2),
            3 => Demand::max(1),
            _ => Demand::NONE,
        });
        let outlet = Outlet::new(sub);
        outlet.start_self();
        let offers: Vec<Offer> = (1..=9).map(|v| outlet.offer(v)).collect();
        assert_eq!(lock(&log).values, vec![1, 2, 3, 4, 5]);
        assert_eq!(&offers[5..], &[Offer::NoDemand; 4]);
    }

    #[test]
    fn zero_request_is_a_pause() {
        let (sub, log) = scripted(Demand::NONE, |_| Demand::NONE);
        let outlet = Outlet::with_source(sub, 1..=3);
        outlet.start_self();
        handle(&log).request(Demand::NONE);
        assert!(lock(&log).values.is_empty());
        assert!(!outlet.is_closed());
    }

    #[test]
    fn cancel_is_idempotent_and_final() {
        let (sub, log) = scripted(Demand::max(1), |_| Demand::NONE);
        let outlet = Outlet::with_source(sub, 1..=10);
        outlet.start_self();
        let h = handle(&log);
        h.cancel();
        h.cancel();
        h.request(Demand::UNBOUNDED);
        assert_eq!(lock(&log).values, vec![1]);
        assert!(lock(&log).completions.is_empty());
        assert_eq!(outlet.offer(99), Offer::Closed);
    }

    #[test]
    fn enqueue_holds_value_until_demand() {
        let (sub, log) = scripted(Demand::NONE, |_| Demand::NONE);
        let outlet = Outlet::new(sub);
        outlet.start_self();
        assert!(outlet.enqueue(42));
        assert!(outlet.complete(Completion::Finished));
        assert!(lock(&log).values.is_empty());
        assert!(lock(&log).completions.is_empty());
        handle(&log).request(Demand::max(1));
        assert_eq!(lock(&log).values, vec![42]);
        assert_eq!(lock(&log).completions, vec![Completion::Finished]);
    }

    #[test]
    fn second_terminal_is_ignored() {
        let (sub, log) = scripted(Demand::UNBOUNDED, |_| Demand::NONE);
        let outlet = Outlet::new(sub);
        outlet.start_self();
        assert!(outlet.complete(Completion::Failure("first")));
        assert!(!outlet.complete(Completion::Failure("second")));
        assert_eq!(lock(&log).completions, vec![Completion::Failure("first")]);
    }

    #[test]
    fn values_after_terminal_are_rejected() {
        let (sub, log) = scripted(Demand::NONE, |_| Demand::NONE);
        let outlet = Outlet::new(sub);
        outlet.start_self();
        assert!(outlet.complete(Completion::Finished));
        assert_eq!(outlet.offer(1), Offer::Closed);
        assert!(!outlet.enqueue(2));
        assert!(lock(&log).values.is_empty());
        assert_eq!(lock(&log).completions, vec![Completion::Finished]);
    }

    #[test]
    fn terminal_after_cancel_is_dropped() {
        let (sub, log) = scripted(Demand::max(1), |_| Demand::NONE);
        let outlet = Outlet::new(sub);
        outlet.start_self();
        handle(&log).cancel();
        assert!(!outlet.complete(Completion::Failure("late")));
        assert!(lock(&log).completions.is_empty());
    }

    #[test]
    fn preloaded_value_waits_for_handoff_request() {
        let (sub, log) = scripted(Demand::max(1), |_| Demand::NONE);
        let outlet = Outlet::new(sub);
        outlet.preload(7);
        outlet.start_self();
        assert_eq!(lock(&log).values, vec![7]);
    }

    struct CountingLink {
        demand: Mutex<Vec<Demand>>,
        cancels: AtomicUsize,
    }

    impl Link for CountingLink {
        fn on_demand(&self, demand: Demand) {
            lock(&self.demand).push(demand);
        }

        fn on_cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn link_sees_requests_deltas_and_cancel() {
        let link = Arc::new(CountingLink {
            demand: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        });
        let (sub, log) = scripted(Demand::max(1), |_| Demand::max(3));
        let outlet = Outlet::with_link(sub, Arc::clone(&link) as Arc<dyn Link>);
        outlet.start_self();
        outlet.offer(1);
        handle(&log).cancel();
        handle(&log).cancel();
        assert_eq!(*lock(&link.demand), vec![Demand::max(1), Demand::max(3)]);
        assert_eq!(link.cancels.load(Ordering::SeqCst), 1);
    }
}
