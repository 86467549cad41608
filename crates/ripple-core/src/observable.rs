#![forbid(unsafe_code)]

//! Shared, version-tracked value with change notification.
//!
//! # Design
//!
//! [`Observable<T>`] keeps a value in `Arc<Mutex<..>>` storage. When the
//! value changes (by `PartialEq`), live callbacks are notified in
//! registration order and the new value is published on
//! [`Observable::publisher`], a stream that starts with the current value.
//!
//! # Invariants
//!
//! 1. `version` increments by exactly 1 on each value-changing mutation.
//! 2. `set(v)` where `v == current` is a no-op.
//! 3. Callbacks run outside the lock, so a callback may read or set the
//!    observable.
//! 4. Dead callbacks (dropped [`ChangeGuard`]s) are pruned lazily.
//!
//! # Failure Modes
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | Concurrent `set` from two threads | Both applied; notification order between them is unspecified |
//! | Guard stored forever | Callback stays registered |

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::error::Never;
use crate::lock;
use crate::publisher::{AnyPublisher, PublisherExt};
use crate::subject::CurrentValueSubject;

type CallbackArc<T> = Arc<dyn Fn(&T) + Send + Sync>;
type CallbackWeak<T> = Weak<dyn Fn(&T) + Send + Sync>;

struct ObservableInner<T> {
    value: T,
    version: u64,
    subscribers: Vec<CallbackWeak<T>>,
}

/// A shared value that announces its changes.
///
/// Cloning creates another handle to the same value.
pub struct Observable<T> {
    inner: Arc<Mutex<ObservableInner<T>>>,
    stream: CurrentValueSubject<T, Never>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            stream: self.stream.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl<T> Observable<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Version 0, no subscribers.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            stream: CurrentValueSubject::new(value.clone()),
            inner: Arc::new(Mutex::new(ObservableInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        lock(&self.inner).value.clone()
    }

    /// Borrow the value for the duration of `f`. `f` must not touch this
    /// observable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&lock(&self.inner).value)
    }

    /// Replace the value, notifying if it changed.
    pub fn set(&self, value: T) {
        let callbacks = {
            let mut inner = lock(&self.inner);
            if inner.value == value {
                return;
            }
            inner.value = value.clone();
            inner.version += 1;
            live_callbacks(&mut inner)
        };
        self.notify(&callbacks, value);
    }

    /// Modify the value in place, notifying if it changed.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let (callbacks, value) = {
            let mut inner = lock(&self.inner);
            let old = inner.value.clone();
            f(&mut inner.value);
            if inner.value == old {
                return;
            }
            inner.version += 1;
            (live_callbacks(&mut inner), inner.value.clone())
        };
        self.notify(&callbacks, value);
    }

    /// Call `callback` with every new value until the guard is dropped.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ChangeGuard {
        let strong: CallbackArc<T> = Arc::new(callback);
        lock(&self.inner).subscribers.push(Arc::downgrade(&strong));
        ChangeGuard {
            _guard: Box::new(strong),
        }
    }

    /// Stream of the current value followed by every change.
    #[must_use]
    pub fn publisher(&self) -> AnyPublisher<T, Never> {
        self.stream.clone().boxed()
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        lock(&self.inner).version
    }

    /// Registered callbacks, including dead ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).subscribers.len()
    }

    fn notify(&self, callbacks: &[CallbackArc<T>], value: T) {
        for callback in callbacks {
            callback(&value);
        }
        self.stream.send(value);
    }
}

fn live_callbacks<T>(inner: &mut ObservableInner<T>) -> Vec<CallbackArc<T>> {
    inner.subscribers.retain(|w| w.strong_count() > 0);
    inner.subscribers.iter().filter_map(Weak::upgrade).collect()
}

/// Keeps an [`Observable::subscribe`] callback registered.
#[must_use = "dropping the guard unsubscribes the callback"]
pub struct ChangeGuard {
    _guard: Box<dyn std::any::Any + Send + Sync>,
}

impl fmt::Debug for ChangeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeGuard").finish_non_exhaustive()
    }
}
