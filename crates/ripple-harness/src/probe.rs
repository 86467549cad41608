#![forbid(unsafe_code)]

//! Contract-checking test subscriber.
//!
//! [`TestSubscriber`] records everything it receives and checks each event
//! against the subscriber contract. The paired [`Probe`] stays with the test:
//! it requests, cancels, and inspects what was recorded.
//!
//! # Invariants checked
//!
//! | Check | Violation |
//! |-------|-----------|
//! | One subscription per subscriber | [`ProtocolViolation::DuplicateSubscription`] |
//! | No value before the subscription | [`ProtocolViolation::ValueBeforeSubscription`] |
//! | No value after the terminal signal | [`ProtocolViolation::ValueAfterTerminal`] |
//! | No value after cancel | [`ProtocolViolation::ValueAfterCancel`] |
//! | Values never exceed cumulative demand | [`ProtocolViolation::DemandExceeded`] |
//! | At most one terminal signal | [`ProtocolViolation::DuplicateTerminal`] |

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ripple_core::{Completion, Demand, ProtocolViolation, Subscriber, SubscriptionHandle};
use tracing::warn;

/// One recorded event, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent<T, E> {
    Subscribed,
    /// Demand granted, by an explicit request or a value's reply.
    Requested(Demand),
    Value(T),
    Completion(Completion<E>),
    Cancelled,
}

struct ProbeState<T, E> {
    subscription: Option<SubscriptionHandle>,
    subscribed: bool,
    events: Vec<ProbeEvent<T, E>>,
    granted: Demand,
    delivered: u64,
    terminated: bool,
    cancelled: bool,
    violations: Vec<ProtocolViolation>,
}

impl<T, E> ProbeState<T, E> {
    fn violate(&mut self, violation: ProtocolViolation) {
        warn!(%violation, "protocol violation");
        self.violations.push(violation);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Test-side handle to a [`TestSubscriber`]'s recording.
pub struct Probe<T, E> {
    state: Arc<Mutex<ProbeState<T, E>>>,
}

impl<T, E> Clone for Probe<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> fmt::Debug for Probe<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Probe")
            .field("subscribed", &state.subscribed)
            .field("delivered", &state.delivered)
            .field("granted", &state.granted)
            .field("terminated", &state.terminated)
            .field("cancelled", &state.cancelled)
            .field("violations", &state.violations.len())
            .finish()
    }
}

impl<T: Clone, E: Clone> Probe<T, E> {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProbeState {
                subscription: None,
                subscribed: false,
                events: Vec::new(),
                granted: Demand::NONE,
                delivered: 0,
                terminated: false,
                cancelled: false,
                violations: Vec::new(),
            })),
        }
    }

    /// Ask for more values through the recorded subscription.
    pub fn request(&self, demand: Demand) {
        let handle = {
            let mut state = lock(&self.state);
            state.granted += demand;
            state.events.push(ProbeEvent::Requested(demand));
            state.subscription.clone()
        };
        if let Some(handle) = handle {
            handle.request(demand);
        }
    }

    /// Cancel through the recorded subscription.
    pub fn cancel(&self) {
        let handle = {
            let mut state = lock(&self.state);
            state.cancelled = true;
            state.events.push(ProbeEvent::Cancelled);
            state.subscription.clone()
        };
        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    #[must_use]
    pub fn values(&self) -> Vec<T> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|event| match event {
                ProbeEvent::Value(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn completion(&self) -> Option<Completion<E>> {
        lock(&self.state).events.iter().find_map(|event| match event {
            ProbeEvent::Completion(completion) => Some(completion.clone()),
            _ => None,
        })
    }

    #[must_use]
    pub fn events(&self) -> Vec<ProbeEvent<T, E>> {
        lock(&self.state).events.clone()
    }

    #[must_use]
    pub fn violations(&self) -> Vec<ProtocolViolation> {
        lock(&self.state).violations.clone()
    }

    /// True once a subscription arrived, even after termination.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        lock(&self.state).subscribed
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        lock(&self.state).terminated
    }

    /// Values delivered so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        lock(&self.state).delivered
    }

    /// Cumulative demand granted so far.
    #[must_use]
    pub fn granted(&self) -> Demand {
        lock(&self.state).granted
    }

    /// Panic with every recorded violation, if there are any.
    pub fn assert_conforms(&self) {
        let violations = self.violations();
        assert!(
            violations.is_empty(),
            "stream broke the subscriber contract: {}",
            violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        );
    }
}

type Policy<T> = Box<dyn FnMut(&T) -> Demand + Send>;

/// Subscriber that records and checks everything it receives.
pub struct TestSubscriber<T, E> {
    initial: Demand,
    policy: Policy<T>,
    probe: Probe<T, E>,
}

impl<T, E> TestSubscriber<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Requests `initial` on subscription and nothing more on its own.
    #[must_use]
    pub fn new(initial: Demand) -> (Self, Probe<T, E>) {
        Self::with_policy(initial, |_| Demand::NONE)
    }

    /// Requests unbounded demand on subscription.
    #[must_use]
    pub fn unbounded() -> (Self, Probe<T, E>) {
        Self::new(Demand::UNBOUNDED)
    }

    /// Requests `initial`, then answers each value with `policy(value)`.
    #[must_use]
    pub fn with_policy(
        initial: Demand,
        policy: impl FnMut(&T) -> Demand + Send + 'static,
    ) -> (Self, Probe<T, E>) {
        let probe = Probe::new();
        (
            Self {
                initial,
                policy: Box::new(policy),
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl<T, E> Subscriber for TestSubscriber<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Input = T;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        {
            let mut state = lock(&self.probe.state);
            if state.subscribed {
                state.violate(ProtocolViolation::DuplicateSubscription);
                return;
            }
            state.subscribed = true;
            state.subscription = Some(Arc::clone(&subscription));
            state.events.push(ProbeEvent::Subscribed);
            state.granted += self.initial;
            if !self.initial.is_none() {
                state.events.push(ProbeEvent::Requested(self.initial));
            }
        }
        if !self.initial.is_none() {
            subscription.request(self.initial);
        }
    }

    fn receive(&mut self, input: T) -> Demand {
        {
            let mut state = lock(&self.probe.state);
            state.delivered += 1;
            let index = state.delivered;
            if !state.subscribed {
                state.violate(ProtocolViolation::ValueBeforeSubscription);
            }
            if state.terminated {
                state.violate(ProtocolViolation::ValueAfterTerminal { index });
            }
            if state.cancelled {
                state.violate(ProtocolViolation::ValueAfterCancel { index });
            }
            if let Some(granted) = state.granted.bounded()
                && index > granted as u64
            {
                let granted = state.granted;
                state.violate(ProtocolViolation::DemandExceeded {
                    delivered: index,
                    granted,
                });
            }
            state.events.push(ProbeEvent::Value(input.clone()));
        }
        let reply = (self.policy)(&input);
        if !reply.is_none() {
            let mut state = lock(&self.probe.state);
            state.granted += reply;
            state.events.push(ProbeEvent::Requested(reply));
        }
        reply
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        let mut state = lock(&self.probe.state);
        if state.terminated {
            state.violate(ProtocolViolation::DuplicateTerminal);
            return;
        }
        state.terminated = true;
        // The producer is done with us; drop the handle to break the cycle.
        state.subscription = None;
        state.events.push(ProbeEvent::Completion(completion));
    }
}
