#![forbid(unsafe_code)]

//! Subscriptions and cancellation guards.
//!
//! A [`Subscription`] is the subscriber's half of a producer/subscriber link:
//! it asks for more values and cancels. After cancel, or after the producer
//! sent its terminal signal, a subscription is inert and every call on it is
//! a no-op.
//!
//! Lifetimes are scoped, never global: [`AnyCancellable`] cancels when
//! dropped, and a [`CancelBag`] owns a group of them for the lifetime of
//! whatever owns the bag.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::demand::Demand;
use crate::lock;

/// The subscriber-side control surface of one producer/subscriber link.
pub trait Subscription: Send + Sync {
    /// Add `demand` to the outstanding total. `Demand::NONE` is legal and
    /// has no effect.
    fn request(&self, demand: Demand);

    /// Stop delivery and release the producer's resources. Idempotent.
    fn cancel(&self);
}

/// Shared handle to a subscription, as handed to
/// [`Subscriber::receive_subscription`](crate::Subscriber::receive_subscription).
pub type SubscriptionHandle = Arc<dyn Subscription>;

/// A subscription that never produces anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct InertSubscription;

impl Subscription for InertSubscription {
    fn request(&self, _demand: Demand) {}

    fn cancel(&self) {}
}

#[derive(Default)]
struct SlotState {
    handle: Option<SubscriptionHandle>,
    cancelled: bool,
}

/// A late-bound holder for a subscription handle.
///
/// Subscribers that must cancel from outside their callbacks (sinks,
/// operators that short-circuit) park their handle here. Cancelling before
/// the handle arrives is remembered: the handle is cancelled on arrival.
#[derive(Clone, Default)]
pub struct SubscriptionSlot {
    state: Arc<Mutex<SlotState>>,
}

impl SubscriptionSlot {
    /// Create an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handle`. Returns `false` (and cancels `handle`) when the slot
    /// was already cancelled or already holds a handle.
    pub fn set(&self, handle: SubscriptionHandle) -> bool {
        let accepted = {
            let mut state = lock(&self.state);
            if state.cancelled || state.handle.is_some() {
                false
            } else {
                state.handle = Some(Arc::clone(&handle));
                true
            }
        };
        if !accepted {
            handle.cancel();
        }
        accepted
    }

    /// The stored handle, if any.
    #[must_use]
    pub fn get(&self) -> Option<SubscriptionHandle> {
        lock(&self.state).handle.clone()
    }

    /// Forward a request to the stored handle.
    pub fn request(&self, demand: Demand) {
        if let Some(handle) = self.get() {
            handle.request(demand);
        }
    }

    /// Cancel the stored handle (now or on arrival) and drop it.
    pub fn cancel(&self) {
        let handle = {
            let mut state = lock(&self.state);
            state.cancelled = true;
            state.handle.take()
        };
        if let Some(handle) = handle {
            handle.cancel();
        }
    }

    /// Drop the stored handle without cancelling it. Used once the producer
    /// has terminated, to break the producer/subscriber reference cycle.
    pub fn release(&self) {
        let handle = lock(&self.state).handle.take();
        drop(handle);
    }

    /// True once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        lock(&self.state).cancelled
    }
}

impl fmt::Debug for SubscriptionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("SubscriptionSlot")
            .field("attached", &state.handle.is_some())
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

/// Anything that can be cancelled.
pub trait Cancellable {
    /// Cancel. Must be idempotent.
    fn cancel(&self);
}

impl Cancellable for SubscriptionSlot {
    fn cancel(&self) {
        SubscriptionSlot::cancel(self);
    }
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// RAII cancellation guard: cancels the wrapped action when dropped.
#[must_use = "dropping an AnyCancellable cancels the subscription immediately"]
pub struct AnyCancellable {
    action: Mutex<Option<CancelFn>>,
}

impl AnyCancellable {
    /// Wrap an arbitrary cancel action.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Guard that cancels `slot`.
    pub fn from_slot(slot: SubscriptionSlot) -> Self {
        Self::new(move || slot.cancel())
    }

    /// Move this guard into `bag`, tying its lifetime to the bag's owner.
    pub fn store_in(self, bag: &mut CancelBag) {
        bag.insert(self);
    }

    /// Run the cancel action if it has not run yet.
    pub fn cancel(&self) {
        let action = lock(&self.action).take();
        if let Some(action) = action {
            action();
        }
    }

    /// True once the guard has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        lock(&self.action).is_none()
    }
}

impl Cancellable for AnyCancellable {
    fn cancel(&self) {
        AnyCancellable::cancel(self);
    }
}

impl Drop for AnyCancellable {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for AnyCancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyCancellable")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Scoped owner for a group of cancellation guards.
///
/// Dropping the bag cancels everything in it.
#[derive(Debug, Default)]
pub struct CancelBag {
    items: Vec<AnyCancellable>,
}

impl CancelBag {
    /// Create an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `cancellable`.
    pub fn insert(&mut self, cancellable: AnyCancellable) {
        self.items.push(cancellable);
    }

    /// Number of guards held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the bag holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cancel and drop every guard.
    pub fn cancel_all(&mut self) {
        self.items.clear();
    }
}
