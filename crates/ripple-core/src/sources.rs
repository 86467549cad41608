#![forbid(unsafe_code)]

//! Cold publishers: every subscription starts an independent run.
//!
//! | Source | Emits |
//! |--------|-------|
//! | [`Just`] | one value, then finishes |
//! | [`Empty`] | finishes immediately |
//! | [`Fail`] | fails immediately |
//! | [`Sequence`] | the items of an iterator, pulled as demand allows |
//! | [`Deferred`] | whatever a [`Promise`] is fulfilled with, possibly later and from another thread |

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::error::Never;
use crate::outlet::{Downstream, Outlet};
use crate::publisher::Publisher;
use crate::subscriber::{Completion, Subscriber};

/// Emits one value, then finishes.
#[derive(Debug, Clone)]
pub struct Just<T> {
    value: T,
}

impl<T> Just<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T> Publisher for Just<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;
    type Failure = Never;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = Never>,
    {
        Outlet::with_source(subscriber, std::iter::once(self.value.clone())).start_self();
    }
}

/// Finishes immediately without emitting.
pub struct Empty<T, E = Never> {
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<T, E> Empty<T, E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T, E> Default for Empty<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Clone for Empty<T, E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Empty<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Empty")
    }
}

impl<T, E> Publisher for Empty<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = E>,
    {
        Outlet::with_source(subscriber, std::iter::empty()).start_self();
    }
}

/// Fails immediately with a clone of its error.
pub struct Fail<T, E> {
    error: E,
    _marker: PhantomData<fn() -> T>,
}

impl<T, E> Fail<T, E> {
    pub fn new(error: E) -> Self {
        Self {
            error,
            _marker: PhantomData,
        }
    }
}

impl<T, E: Clone> Clone for Fail<T, E> {
    fn clone(&self) -> Self {
        Self::new(self.error.clone())
    }
}

impl<T, E: fmt::Debug> fmt::Debug for Fail<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fail").field("error", &self.error).finish()
    }
}

impl<T, E> Publisher for Fail<T, E>
where
    T: Send + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = E>,
    {
        let outlet = Outlet::new(subscriber);
        outlet.complete(Completion::Failure(self.error.clone()));
        outlet.start_self();
    }
}

/// Emits the items of an iterable, one per unit of demand, then finishes.
#[derive(Debug, Clone)]
pub struct Sequence<I> {
    items: I,
}

impl<I> Sequence<I> {
    pub fn new(items: I) -> Self {
        Self { items }
    }
}

impl<I> Publisher for Sequence<I>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    type Output = I::Item;
    type Failure = Never;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = I::Item, Failure = Never>,
    {
        Outlet::with_source(subscriber, self.items.clone().into_iter()).start_self();
    }
}

/// Write-once completion handle given to a [`Deferred`] body.
///
/// Keeps the subscriber's outlet alive until fulfilled, so the result
/// arrives even when the subscriber never kept its subscription. After a
/// cancel the outlet has already let go of the subscriber and the result is
/// dropped.
pub struct Promise<T, E> {
    target: Arc<dyn Downstream<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Resolve with `result`: a value followed by completion, or a failure.
    pub fn fulfill(self, result: Result<T, E>) {
        let target = self.target;
        if target.is_closed() {
            trace!("promise fulfilled after cancel");
            return;
        }
        match result {
            Ok(value) => {
                if target.enqueue(value) {
                    target.complete(Completion::Finished);
                }
            }
            Err(error) => {
                target.complete(Completion::Failure(error));
            }
        }
    }

    /// Shorthand for `fulfill(Ok(value))`.
    pub fn succeed(self, value: T) {
        self.fulfill(Ok(value));
    }

    /// Shorthand for `fulfill(Err(error))`.
    pub fn fail(self, error: E) {
        self.fulfill(Err(error));
    }

    /// True once the subscriber cancelled or the outlet already terminated.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.target.is_closed()
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("cancelled", &self.target.is_closed())
            .finish()
    }
}

/// One-value-then-complete publisher whose body runs once per subscription.
///
/// The body receives a [`Promise`] and may fulfil it synchronously or hand
/// it to another thread. The value waits for demand; the subscriber's
/// cancel discards it.
pub struct Deferred<T, E, F> {
    body: Arc<F>,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<T, E, F> Deferred<T, E, F>
where
    F: Fn(Promise<T, E>) + Send + Sync + 'static,
{
    pub fn new(body: F) -> Self {
        Self {
            body: Arc::new(body),
            _marker: PhantomData,
        }
    }
}

impl<T, E, F> Clone for Deferred<T, E, F> {
    fn clone(&self) -> Self {
        Self {
            body: Arc::clone(&self.body),
            _marker: PhantomData,
        }
    }
}

impl<T, E, F> Publisher for Deferred<T, E, F>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(Promise<T, E>) + Send + Sync + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = E>,
    {
        let outlet = Outlet::new(subscriber);
        outlet.start_self();
        let target: Arc<dyn Downstream<T, E>> = outlet;
        (self.body)(Promise { target });
    }
}
