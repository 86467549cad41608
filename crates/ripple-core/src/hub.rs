#![forbid(unsafe_code)]

//! Fan-out hub shared by subjects, `share` and `multicast`.
//!
//! The hub owns its downstream registry and, when relaying, the upstream
//! subscription. Each downstream is an [`Outlet`] whose link holds only the
//! downstream's id and a weak reference back to the hub, so a lingering
//! downstream handle never keeps a torn-down hub alive.
//!
//! # Forwarding rule
//!
//! Upstream demand is kept at the smallest *positive* outstanding demand
//! across downstreams. A downstream that currently wants nothing does not
//! hold the others back; it misses values emitted while it is paused.
//! Nothing is buffered beyond what each downstream has asked for.
//!
//! # Invariants
//!
//! 1. The hub lock is held only for registry and demand bookkeeping, never
//!    across a subscriber callback or an upstream `request`/`cancel`.
//! 2. Lock order is hub, then outlet.
//! 3. After the terminal signal the registry is empty and stays empty; late
//!    subscribers receive the stored terminal immediately.
//!
//! # Failure Modes
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | Value sent with no hungry downstream | Dropped, logged at trace |
//! | Upstream handed over after disconnect | Cancelled immediately |
//! | Send after terminal | Ignored |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use crate::demand::Demand;
use crate::lock;
use crate::outlet::{Downstream, Link, Offer, Outlet};
use crate::subscriber::{Completion, Subscriber};
use crate::subscription::SubscriptionHandle;

enum Upstream {
    Idle,
    Connected(SubscriptionHandle),
    Disconnected,
}

struct HubState<T, E> {
    downstreams: Vec<(u64, Arc<dyn Downstream<T, E>>)>,
    terminal: Option<Completion<E>>,
    upstream: Upstream,
    /// Upstream demand requested but not yet answered with a value.
    granted: Demand,
    /// Latest value, kept only by hubs that replay it to new subscribers.
    current: Option<T>,
}

impl<T, E> HubState<T, E> {
    /// Demand to add upstream so `granted` reaches the forwarding target.
    fn plan(&mut self) -> Demand {
        if self.terminal.is_some() || !matches!(self.upstream, Upstream::Connected(_)) {
            return Demand::NONE;
        }
        let target = Demand::min_positive(self.downstreams.iter().map(|(_, d)| d.outstanding()));
        let need = match (target, self.granted) {
            (_, Demand::Unbounded) => Demand::NONE,
            (Demand::Unbounded, _) => Demand::Unbounded,
            (Demand::Bounded(t), Demand::Bounded(g)) => Demand::max(t.saturating_sub(g)),
        };
        self.granted += need;
        need
    }

    fn upstream_handle(&self) -> Option<SubscriptionHandle> {
        match &self.upstream {
            Upstream::Connected(handle) => Some(Arc::clone(handle)),
            Upstream::Idle | Upstream::Disconnected => None,
        }
    }
}

pub(crate) struct Hub<T, E> {
    state: Mutex<HubState<T, E>>,
    next_id: AtomicU64,
}

impl<T, E> Hub<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub(crate) fn new(current: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState {
                downstreams: Vec::new(),
                terminal: None,
                upstream: Upstream::Idle,
                granted: Demand::NONE,
                current,
            }),
            next_id: AtomicU64::new(0),
        })
    }

    /// Register `subscriber` and hand it its subscription.
    pub(crate) fn attach<S>(self: &Arc<Self>, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = E>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let link = Arc::new(HubLink {
            id,
            hub: Arc::downgrade(self),
        });
        let outlet = Outlet::with_link(subscriber, link);
        let terminal = {
            let mut state = lock(&self.state);
            match &state.terminal {
                Some(terminal) => Some(terminal.clone()),
                None => {
                    if let Some(value) = &state.current {
                        outlet.preload(value.clone());
                    }
                    let downstream: Arc<dyn Downstream<T, E>> = outlet.clone();
                    state.downstreams.push((id, downstream));
                    None
                }
            }
        };
        debug!(id, late = terminal.is_some(), "downstream attached");
        outlet.start_self();
        if let Some(terminal) = terminal {
            outlet.complete(terminal);
        }
    }

    /// Deliver `value` to every downstream with room for it.
    pub(crate) fn send(&self, value: T) {
        let targets = {
            let mut state = lock(&self.state);
            if state.terminal.is_some() {
                return;
            }
            if state.current.is_some() {
                state.current = Some(value.clone());
            }
            snapshot(&state.downstreams)
        };
        broadcast(&targets, value);
    }

    /// A value that answers upstream demand. Returns the demand to add
    /// upstream afterwards.
    fn relay(&self, value: T) -> Demand {
        let targets = {
            let mut state = lock(&self.state);
            if state.terminal.is_some() {
                return Demand::NONE;
            }
            state.granted = state.granted.decrement();
            if state.current.is_some() {
                state.current = Some(value.clone());
            }
            snapshot(&state.downstreams)
        };
        broadcast(&targets, value);
        lock(&self.state).plan()
    }

    /// Store the terminal signal and pass it to every downstream.
    pub(crate) fn send_completion(&self, completion: Completion<E>) {
        let targets = {
            let mut state = lock(&self.state);
            if state.terminal.is_some() {
                debug!("hub already terminated; completion ignored");
                return;
            }
            state.terminal = Some(completion.clone());
            state.upstream = Upstream::Disconnected;
            state.granted = Demand::NONE;
            std::mem::take(&mut state.downstreams)
        };
        debug!(
            downstreams = targets.len(),
            failed = completion.is_failure(),
            "hub terminated"
        );
        for (_, downstream) in targets {
            downstream.complete(completion.clone());
        }
    }

    pub(crate) fn current(&self) -> Option<T> {
        lock(&self.state).current.clone()
    }

    pub(crate) fn set_current(&self, value: T) {
        lock(&self.state).current = Some(value);
    }

    pub(crate) fn downstream_count(&self) -> usize {
        lock(&self.state).downstreams.len()
    }

    pub(crate) fn is_terminated(&self) -> bool {
        lock(&self.state).terminal.is_some()
    }

    /// Cancel the upstream subscription, now or as soon as it arrives.
    pub(crate) fn disconnect(&self) {
        let handle = {
            let mut state = lock(&self.state);
            let previous = std::mem::replace(&mut state.upstream, Upstream::Disconnected);
            state.granted = Demand::NONE;
            match previous {
                Upstream::Connected(handle) => Some(handle),
                Upstream::Idle | Upstream::Disconnected => None,
            }
        };
        if let Some(handle) = handle {
            debug!("hub disconnected from upstream");
            handle.cancel();
        }
    }

    fn connect_upstream(&self, handle: SubscriptionHandle) {
        let accepted = {
            let mut state = lock(&self.state);
            match state.upstream {
                Upstream::Idle if state.terminal.is_none() => {
                    state.upstream = Upstream::Connected(Arc::clone(&handle));
                    true
                }
                _ => false,
            }
        };
        if accepted {
            self.rebalance();
        } else {
            handle.cancel();
        }
    }

    /// Top upstream demand back up to the forwarding target.
    fn rebalance(&self) {
        let (handle, need) = {
            let mut state = lock(&self.state);
            let need = state.plan();
            (state.upstream_handle(), need)
        };
        if !need.is_none()
            && let Some(handle) = handle
        {
            trace!(%need, "forwarding demand upstream");
            handle.request(need);
        }
    }

    fn detach(&self, id: u64) {
        lock(&self.state).downstreams.retain(|(other, _)| *other != id);
        debug!(id, "downstream detached");
        self.rebalance();
    }
}

fn snapshot<T, E>(downstreams: &[(u64, Arc<dyn Downstream<T, E>>)]) -> Vec<Arc<dyn Downstream<T, E>>> {
    downstreams.iter().map(|(_, d)| Arc::clone(d)).collect()
}

fn broadcast<T: Clone, E>(targets: &[Arc<dyn Downstream<T, E>>], value: T) {
    let Some((last, rest)) = targets.split_last() else {
        trace!("value dropped: no downstreams");
        return;
    };
    let mut missed = 0usize;
    for downstream in rest {
        if downstream.offer(value.clone()) != Offer::Accepted {
            missed += 1;
        }
    }
    if last.offer(value) != Offer::Accepted {
        missed += 1;
    }
    if missed > 0 {
        trace!(missed, total = targets.len(), "value skipped downstreams without demand");
    }
}

/// Back-reference from one downstream outlet to its hub.
struct HubLink<T, E> {
    id: u64,
    hub: Weak<Hub<T, E>>,
}

impl<T, E> Link for HubLink<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn on_demand(&self, _demand: Demand) {
        if let Some(hub) = self.hub.upgrade() {
            hub.rebalance();
        }
    }

    fn on_cancel(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.detach(self.id);
        }
    }
}

/// Subscriber that feeds an upstream publisher into a hub.
pub(crate) struct HubInlet<T, E> {
    hub: Arc<Hub<T, E>>,
}

impl<T, E> HubInlet<T, E> {
    pub(crate) fn new(hub: Arc<Hub<T, E>>) -> Self {
        Self { hub }
    }
}

impl<T, E> Subscriber for HubInlet<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Input = T;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.hub.connect_upstream(subscription);
    }

    fn receive(&mut self, input: T) -> Demand {
        self.hub.relay(input)
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        self.hub.send_completion(completion);
    }
}
