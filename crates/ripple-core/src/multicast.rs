#![forbid(unsafe_code)]

//! One upstream run, many subscribers.
//!
//! [`Multicast`] registers subscribers on a relay subject and starts the
//! upstream only on [`Multicast::connect`], so every subscriber attached
//! before connecting sees the same first value. [`Share`] is the automatic
//! form: the first subscriber connects.
//!
//! Neither replays: a subscriber attached after N values were relayed never
//! receives those N values.

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::hub::{Hub, HubInlet};
use crate::publisher::Publisher;
use crate::subject::PassthroughSubject;
use crate::subscriber::Subscriber;
use crate::subscription::Cancellable;

struct Relay<P: Publisher> {
    upstream: P,
    hub: Arc<Hub<P::Output, P::Failure>>,
    connected: AtomicBool,
}

impl<P> Relay<P>
where
    P: Publisher,
    P::Output: Clone,
    P::Failure: Clone,
{
    /// Subscribe the hub to upstream, once.
    fn connect(&self) -> Connection<P::Output, P::Failure> {
        if self.connected.swap(true, Ordering::AcqRel) {
            debug!("already connected");
        } else {
            debug!("connecting upstream");
            self.upstream.subscribe(HubInlet::new(Arc::clone(&self.hub)));
        }
        Connection {
            hub: Arc::downgrade(&self.hub),
        }
    }
}

/// Handle to a connected upstream run. Dropping it leaves the run going;
/// call [`disconnect`](Self::disconnect) to stop it.
pub struct Connection<T, E> {
    hub: Weak<Hub<T, E>>,
}

impl<T, E> Connection<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Cancel the upstream run. Attached subscribers stay attached but
    /// receive nothing further.
    pub fn disconnect(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.disconnect();
        }
    }
}

impl<T, E> Cancellable for Connection<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn cancel(&self) {
        self.disconnect();
    }
}

impl<T, E> fmt::Debug for Connection<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("live", &(self.hub.strong_count() > 0))
            .finish()
    }
}

/// Publisher returned by [`PublisherExt::multicast`](crate::PublisherExt::multicast).
pub struct Multicast<P: Publisher> {
    relay: Arc<Relay<P>>,
}

impl<P> Multicast<P>
where
    P: Publisher,
    P::Output: Clone,
    P::Failure: Clone,
{
    pub(crate) fn new(upstream: P, subject: PassthroughSubject<P::Output, P::Failure>) -> Self {
        Self {
            relay: Arc::new(Relay {
                upstream,
                hub: subject.hub,
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Start the upstream run. Calling it again returns a handle to the same
    /// run.
    pub fn connect(&self) -> Connection<P::Output, P::Failure> {
        self.relay.connect()
    }
}

impl<P: Publisher> Clone for Multicast<P> {
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
        }
    }
}

impl<P: Publisher> fmt::Debug for Multicast<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multicast")
            .field("connected", &self.relay.connected.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<P> Publisher for Multicast<P>
where
    P: Publisher,
    P::Output: Clone,
    P::Failure: Clone,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = P::Failure>,
    {
        self.relay.hub.attach(subscriber);
    }
}

/// Publisher returned by [`PublisherExt::share`](crate::PublisherExt::share).
pub struct Share<P: Publisher> {
    relay: Arc<Relay<P>>,
}

impl<P> Share<P>
where
    P: Publisher,
    P::Output: Clone,
    P::Failure: Clone,
{
    pub(crate) fn new(upstream: P) -> Self {
        Self {
            relay: Arc::new(Relay {
                upstream,
                hub: Hub::new(None),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribers currently attached.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.relay.hub.downstream_count()
    }
}

impl<P: Publisher> Clone for Share<P> {
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
        }
    }
}

impl<P: Publisher> fmt::Debug for Share<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Share")
            .field("connected", &self.relay.connected.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<P> Publisher for Share<P>
where
    P: Publisher,
    P::Output: Clone,
    P::Failure: Clone,
{
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = P::Output, Failure = P::Failure>,
    {
        self.relay.hub.attach(subscriber);
        let _connection = self.relay.connect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Never;
    use crate::lock;
    use crate::publisher::PublisherExt;
    use crate::sources::{Deferred, Sequence};
    use crate::subscriber::Completion;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn tagged(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl FnMut(i32) + Send + 'static {
        let log = Arc::clone(log);
        move |v| lock(&log).push(format!("{tag}:{v}"))
    }

    #[test]
    fn share_runs_upstream_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);
        let upstream = Deferred::new(move |promise: crate::Promise<i32, Never>| {
            r.fetch_add(1, Ordering::SeqCst);
            promise.succeed(7);
        });
        let shared = upstream.share();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = shared.clone().sink_values(tagged(&log, "a"));
        let _b = shared.clone().sink_values(tagged(&log, "b"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(*lock(&log), vec!["a:7"]);
    }

    #[test]
    fn share_late_subscriber_sees_only_later_values() {
        let subject = PassthroughSubject::<i32, Never>::new();
        let shared = subject.clone().share();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = shared.clone().sink_values(tagged(&log, "a"));
        subject.send(1);
        subject.send(2);
        let _b = shared.clone().sink_values(tagged(&log, "b"));
        subject.send(3);
        assert_eq!(*lock(&log), vec!["a:1", "a:2", "a:3", "b:3"]);
        assert_eq!(shared.subscriber_count(), 2);
    }

    #[test]
    fn multicast_waits_for_connect() {
        let multicast = Sequence::new(vec![1, 2]).multicast(PassthroughSubject::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = multicast.clone().sink_values(tagged(&log, "a"));
        let _b = multicast.clone().sink_values(tagged(&log, "b"));
        assert!(lock(&log).is_empty());

        let _connection = multicast.connect();
        assert_eq!(*lock(&log), vec!["a:1", "b:1", "a:2", "b:2"]);
    }

    #[test]
    fn second_connect_is_a_no_op() {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);
        let multicast = Deferred::new(move |promise: crate::Promise<i32, Never>| {
            r.fetch_add(1, Ordering::SeqCst);
            promise.succeed(1);
        })
        .multicast(PassthroughSubject::new());
        let _first = multicast.connect();
        let _second = multicast.connect();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disconnect_stops_relaying() {
        let subject = PassthroughSubject::<i32, &'static str>::new();
        let multicast = subject.clone().multicast(PassthroughSubject::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let _guard = multicast
            .clone()
            .sink(move |v| lock(&l).push(v), |_: Completion<&'static str>| {});
        let connection = multicast.connect();
        subject.send(1);
        connection.disconnect();
        subject.send(2);
        assert_eq!(*lock(&log), vec![1]);
        assert_eq!(subject.subscriber_count(), 0);
    }
}
