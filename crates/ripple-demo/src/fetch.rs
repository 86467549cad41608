#![forbid(unsafe_code)]

//! One-shot request/response exchanges as publishers.
//!
//! A [`Fetcher`] turns a [`Request`] into a publisher that emits the body
//! once and finishes, or fails with a [`FetchError`]. Nothing is sent until
//! the publisher is subscribed, and every subscription sends again.
//!
//! [`MockFetcher`] serves canned bodies with an optional artificial latency,
//! so scenarios and tests run without a network.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use ripple_core::{AnyPublisher, Deferred, Promise, PublisherExt};
use serde::de::DeserializeOwned;
use tracing::debug;
use web_time::Duration;

use crate::error::{DecodeError, FetchError};

/// A GET request for `url`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Request {
    pub url: String,
}

impl Request {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Source of response bodies.
pub trait Fetcher: Send + Sync + 'static {
    /// A publisher of the body of `request`: one value then completion.
    fn fetch(&self, request: &Request) -> AnyPublisher<Vec<u8>, FetchError>;
}

/// Decode a JSON body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Clone)]
enum Reply {
    Body(Vec<u8>),
    Status(u16),
}

/// In-memory [`Fetcher`] with canned replies.
///
/// With zero latency the reply is produced during `subscribe`; otherwise a
/// worker thread sleeps for the latency and then fulfils the request.
#[derive(Clone)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, Reply>>>,
    latency: Duration,
    requests: Arc<AtomicUsize>,
}

impl fmt::Debug for MockFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockFetcher")
            .field("latency", &self.latency)
            .field("requests", &self.request_count())
            .finish()
    }
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Arc::new(Mutex::new(HashMap::new())),
            latency: Duration::ZERO,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay every reply by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Serve `body` at `url`.
    #[must_use]
    pub fn with_body(self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.route(url, Reply::Body(body.into()));
        self
    }

    /// Answer `url` with the error status `code`.
    #[must_use]
    pub fn with_status(self, url: impl Into<String>, code: u16) -> Self {
        self.route(url, Reply::Status(code));
        self
    }

    /// Replace whatever `url` served with `body`.
    pub fn set_body(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.route(url, Reply::Body(body.into()));
    }

    /// Requests actually sent, which counts subscriptions rather than
    /// publishers.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn route(&self, url: impl Into<String>, reply: Reply) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), reply);
    }

    fn respond(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let reply = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned();
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(code)) => Err(FetchError::Status {
                url: url.to_string(),
                code,
            }),
            None => Err(FetchError::Unreachable {
                url: url.to_string(),
            }),
        }
    }
}

impl Fetcher for MockFetcher {
    fn fetch(&self, request: &Request) -> AnyPublisher<Vec<u8>, FetchError> {
        let fetcher = self.clone();
        let url = request.url.clone();
        Deferred::new(move |promise: Promise<Vec<u8>, FetchError>| {
            fetcher.requests.fetch_add(1, Ordering::SeqCst);
            debug!(url = %url, latency_ms = fetcher.latency.as_millis() as u64, "fetch");
            if fetcher.latency.is_zero() {
                promise.fulfill(fetcher.respond(&url));
                return;
            }
            let fetcher = fetcher.clone();
            let url = url.clone();
            thread::spawn(move || {
                thread::sleep(fetcher.latency);
                if promise.is_cancelled() {
                    debug!(url = %url, "fetch abandoned");
                    return;
                }
                promise.fulfill(fetcher.respond(&url));
            });
        })
        .boxed()
    }
}
