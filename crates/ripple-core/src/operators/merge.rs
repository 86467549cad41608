#![forbid(unsafe_code)]

//! `merge`: interleave two same-typed publishers in arrival order.
//!
//! Downstream demand is split between the two sources ("lanes"). With
//! bounded demand every idle lane is asked for one value while the
//! downstream has room, so a silent lane never blocks the other. Both lanes
//! may answer when the room is a single value: the surplus value is parked
//! (at most one per lane) and released in arrival order once the downstream
//! asks for more. Once the downstream asks for unbounded demand both lanes
//! are asked for unbounded demand too.
//!
//! The merged stream finishes when both lanes have finished and every
//! parked value was delivered. It fails as soon as either lane fails; the
//! other lane is cancelled.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use crate::demand::Demand;
use crate::lock;
use crate::outlet::{Link, Offer, Outlet};
use crate::publisher::Publisher;
use crate::subscriber::{Completion, Subscriber};
use crate::subscription::SubscriptionHandle;

/// Publisher returned by [`PublisherExt::merge`](crate::PublisherExt::merge).
pub struct Merge<A, B> {
    a: A,
    b: B,
}

impl<A, B> Merge<A, B> {
    pub(crate) fn new(a: A, b: B) -> Self {
        Self { a, b }
    }
}

impl<A, B> Publisher for Merge<A, B>
where
    A: Publisher,
    B: Publisher<Output = A::Output, Failure = A::Failure>,
{
    type Output = A::Output;
    type Failure = A::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = A::Output, Failure = A::Failure>,
    {
        let shared = Arc::new_cyclic(|weak: &Weak<MergeShared<S>>| {
            let link: Arc<dyn Link> = Arc::new(MergeLink { shared: weak.clone() });
            MergeShared {
                outlet: Outlet::with_link(subscriber, link),
                state: Mutex::new(MergeState::new()),
            }
        });
        shared.outlet.start_self();
        self.a.subscribe(MergeInlet {
            shared: Arc::clone(&shared),
            lane: 0,
        });
        self.b.subscribe(MergeInlet { shared, lane: 1 });
    }
}

#[derive(Default)]
struct Lane {
    subscription: Option<SubscriptionHandle>,
    in_flight: bool,
    /// A value from this lane waits in `parked`.
    parked: bool,
    unbounded: bool,
    done: bool,
}

impl Lane {
    fn idle(&self) -> bool {
        self.subscription.is_some()
            && !self.done
            && !self.unbounded
            && !self.in_flight
            && !self.parked
    }
}

struct MergeState<T> {
    lanes: [Lane; 2],
    /// Values received but not yet handed to the outlet, oldest first.
    parked: VecDeque<(usize, T)>,
    /// One thread at a time moves parked values into the outlet.
    releasing: bool,
    /// Both lanes finished; finish once `parked` is empty.
    finishing: bool,
    terminated: bool,
}

impl<T> MergeState<T> {
    fn new() -> Self {
        Self {
            lanes: [Lane::default(), Lane::default()],
            parked: VecDeque::new(),
            releasing: false,
            finishing: false,
            terminated: false,
        }
    }
}

enum Release<T> {
    Value(T),
    Finish,
    Idle,
}

struct MergeShared<S: Subscriber> {
    outlet: Arc<Outlet<S>>,
    state: Mutex<MergeState<S::Input>>,
}

impl<S: Subscriber> MergeShared<S> {
    /// Move parked values into the outlet while it has room, then finish
    /// if both lanes are done.
    fn release(&self) {
        {
            let mut state = lock(&self.state);
            if state.releasing {
                return;
            }
            state.releasing = true;
        }
        loop {
            let next = {
                let mut state = lock(&self.state);
                let room = self.outlet.outstanding();
                if !room.is_none()
                    && let Some((lane, value)) = state.parked.pop_front()
                {
                    state.lanes[lane].parked = false;
                    Release::Value(value)
                } else if state.finishing && state.parked.is_empty() {
                    state.finishing = false;
                    state.releasing = false;
                    Release::Finish
                } else {
                    state.releasing = false;
                    Release::Idle
                }
            };
            match next {
                Release::Value(value) => {
                    if self.outlet.offer(value) != Offer::Accepted {
                        trace!("parked value dropped: downstream closed");
                    }
                }
                Release::Finish => {
                    debug!("merge finished: both sources done");
                    self.outlet.complete(Completion::Finished);
                    return;
                }
                Release::Idle => return,
            }
        }
    }

    /// Hand out downstream room to the lanes.
    fn pump(&self) {
        let requests: Vec<(SubscriptionHandle, Demand)> = {
            let mut state = lock(&self.state);
            if state.terminated {
                return;
            }
            let room = self.outlet.outstanding();
            let mut requests = Vec::new();
            if room.is_unbounded() {
                for lane in &mut state.lanes {
                    if let Some(subscription) = &lane.subscription
                        && !lane.done
                        && !lane.unbounded
                    {
                        lane.unbounded = true;
                        requests.push((Arc::clone(subscription), Demand::UNBOUNDED));
                    }
                }
            } else {
                let parked = state.parked.len();
                let available = room.bounded().unwrap_or(0).saturating_sub(parked);
                if available > 0 {
                    for lane in &mut state.lanes {
                        if lane.idle()
                            && let Some(subscription) = &lane.subscription
                        {
                            lane.in_flight = true;
                            requests.push((Arc::clone(subscription), Demand::max(1)));
                        }
                    }
                }
            }
            requests
        };
        for (subscription, demand) in requests {
            subscription.request(demand);
        }
    }

    fn cancel_lanes(&self) -> Vec<SubscriptionHandle> {
        let mut state = lock(&self.state);
        state.terminated = true;
        state.finishing = false;
        state.parked.clear();
        state
            .lanes
            .iter_mut()
            .filter_map(|lane| lane.subscription.take())
            .collect()
    }
}

struct MergeLink<S: Subscriber> {
    shared: Weak<MergeShared<S>>,
}

impl<S: Subscriber> Link for MergeLink<S> {
    fn on_demand(&self, _demand: Demand) {
        if let Some(shared) = self.shared.upgrade() {
            shared.release();
            shared.pump();
        }
    }

    fn on_cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            for subscription in shared.cancel_lanes() {
                subscription.cancel();
            }
        }
    }
}

struct MergeInlet<S: Subscriber> {
    shared: Arc<MergeShared<S>>,
    lane: usize,
}

impl<S: Subscriber> Subscriber for MergeInlet<S> {
    type Input = S::Input;
    type Failure = S::Failure;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        let accepted = {
            let mut state = lock(&self.shared.state);
            if state.terminated {
                false
            } else {
                state.lanes[self.lane].subscription = Some(Arc::clone(&subscription));
                true
            }
        };
        if accepted {
            self.shared.pump();
        } else {
            subscription.cancel();
        }
    }

    fn receive(&mut self, input: S::Input) -> Demand {
        {
            let mut state = lock(&self.shared.state);
            if state.terminated {
                return Demand::NONE;
            }
            let lane = &mut state.lanes[self.lane];
            lane.in_flight = false;
            lane.parked = true;
            state.parked.push_back((self.lane, input));
        }
        self.shared.release();
        self.shared.pump();
        Demand::NONE
    }

    fn receive_completion(&mut self, completion: Completion<S::Failure>) {
        match completion {
            Completion::Finished => {
                let all_done = {
                    let mut state = lock(&self.shared.state);
                    let lane = &mut state.lanes[self.lane];
                    lane.done = true;
                    lane.in_flight = false;
                    lane.subscription = None;
                    let all_done = !state.terminated && state.lanes.iter().all(|l| l.done);
                    if all_done {
                        state.terminated = true;
                        state.finishing = true;
                    }
                    all_done
                };
                if all_done {
                    self.shared.release();
                } else {
                    self.shared.pump();
                }
            }
            Completion::Failure(error) => {
                if lock(&self.shared.state).terminated {
                    return;
                }
                debug!(lane = self.lane, "merge failing: source failed");
                for subscription in self.shared.cancel_lanes() {
                    subscription.cancel();
                }
                self.shared.outlet.complete(Completion::Failure(error));
            }
        }
    }
}
