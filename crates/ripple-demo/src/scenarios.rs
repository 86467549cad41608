#![forbid(unsafe_code)]

//! Named walkthroughs of the stream core, each producing a transcript.
//!
//! Every scenario returns the lines it would print, so the runner and the
//! tests see the same output. Scenarios that fetch wait for their
//! subscribers to finish, bounded by [`DemoConfig::fetch_latency`] plus a
//! grace period.

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};

use ripple_core::{
    CancelBag, Completion, Demand, Just, Never, PassthroughSubject, Publisher, PublisherExt,
    Subscriber, SubscriptionHandle, ThreadScheduler, ThreadSchedulerConfig,
};
use serde::Deserialize;
use tracing::{info, warn};
use web_time::Duration;

use crate::checkout::{CheckoutInfo, CheckoutViewModel};
use crate::config::DemoConfig;
use crate::currency::{Currency, CurrencyService};
use crate::error::ServiceError;
use crate::fetch::{Fetcher, MockFetcher, Request, decode};

const TODO_URL: &str = "mock://todos/1";
const PAGE_URL: &str = "mock://home";
const GRACE: Duration = Duration::from_secs(2);

/// The walkthroughs, in running order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    Backpressure,
    Decode,
    Sharing,
    Multicast,
    MapVsTryMap,
    Checkout,
}

impl Scenario {
    pub const ALL: [Self; 6] = [
        Self::Backpressure,
        Self::Decode,
        Self::Sharing,
        Self::Multicast,
        Self::MapVsTryMap,
        Self::Checkout,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Backpressure => "backpressure",
            Self::Decode => "decode",
            Self::Sharing => "sharing",
            Self::Multicast => "multicast",
            Self::MapVsTryMap => "map-vs-try-map",
            Self::Checkout => "checkout",
        }
    }

    #[must_use]
    pub const fn summary(self) -> &'static str {
        match self {
            Self::Backpressure => "Demand topped up from inside receive",
            Self::Decode => "Fetch a body and decode it inside try_map",
            Self::Sharing => "One fetch shared by two subscribers",
            Self::Multicast => "Subscribers attach before connect starts the fetch",
            Self::MapVsTryMap => "Typed failures through map, try_map and map_error",
            Self::Checkout => "Debounced currency selection repricing a checkout",
        }
    }

    /// Run the scenario and return its transcript.
    pub fn run(self, config: &DemoConfig) -> Vec<String> {
        info!(scenario = self.name(), "scenario start");
        let lines = match self {
            Self::Backpressure => backpressure(),
            Self::Decode => decode_todo(config),
            Self::Sharing => sharing(config),
            Self::Multicast => multicast(config),
            Self::MapVsTryMap => map_vs_try_map(),
            Self::Checkout => checkout(config),
        };
        info!(scenario = self.name(), lines = lines.len(), "scenario end");
        lines
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.name() == wanted)
            .ok_or_else(|| s.to_string())
    }
}

type Transcript = Arc<Mutex<Vec<String>>>;

fn record(transcript: &Transcript, line: String) {
    transcript
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(line);
}

fn lines(transcript: &Transcript) -> Vec<String> {
    transcript
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Wait for `count` completions or the deadline, whichever comes first.
fn await_done(done: &Receiver<()>, count: usize, deadline: Duration) {
    for _ in 0..count {
        if done.recv_timeout(deadline).is_err() {
            warn!(count, "scenario timed out waiting for completion");
            return;
        }
    }
}

fn mock_fetcher(config: &DemoConfig) -> MockFetcher {
    MockFetcher::new()
        .with_latency(config.fetch_latency)
        .with_body(
            TODO_URL,
            r#"{"userId": 1, "id": 1, "title": "delectus aut autem", "completed": false}"#,
        )
        .with_body(PAGE_URL, "<html><body>ripple</body></html>")
        .with_body(
            config.endpoint.clone(),
            r#"{"base": "USD", "rates": {"EUR": 0.92, "GBP": 0.79, "JPY": 151.3}}"#,
        )
}

// ---------------------------------------------------------------------------
// Backpressure
// ---------------------------------------------------------------------------

/// Starts at two, adds two after `1` and one after `3`.
struct IntSubscriber {
    transcript: Transcript,
}

impl Subscriber for IntSubscriber {
    type Input = i32;
    type Failure = Never;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        subscription.request(Demand::max(2));
    }

    fn receive(&mut self, input: i32) -> Demand {
        record(&self.transcript, format!("Received value {input}"));
        match input {
            1 => Demand::max(2),
            3 => Demand::max(1),
            _ => Demand::NONE,
        }
    }

    fn receive_completion(&mut self, _completion: Completion<Never>) {
        record(&self.transcript, "Received completion".to_string());
    }
}

fn backpressure() -> Vec<String> {
    let transcript = Transcript::default();
    let subject = PassthroughSubject::<i32, Never>::new();
    subject.subscribe(IntSubscriber {
        transcript: Arc::clone(&transcript),
    });
    // 2 + 2 + 1: values past the fifth find no demand and are dropped.
    for value in 1..=9 {
        subject.send(value);
    }
    subject.send_completion(Completion::Finished);
    lines(&transcript)
}

// ---------------------------------------------------------------------------
// Fetch + decode
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Todo {
    user_id: u32,
    id: u32,
    title: String,
    completed: bool,
}

fn decode_todo(config: &DemoConfig) -> Vec<String> {
    let fetcher = mock_fetcher(config);
    let transcript = Transcript::default();
    let (tx, done) = mpsc::channel();
    let mut bag = CancelBag::new();

    let (values, completions) = (Arc::clone(&transcript), Arc::clone(&transcript));
    fetcher
        .fetch(&Request::get(TODO_URL))
        .try_map(|body| decode::<Todo>(&body).map_err(ServiceError::from))
        .sink(
            move |todo| {
                record(
                    &values,
                    format!(
                        "Got todo #{} for user {}: {:?} (completed: {})",
                        todo.id, todo.user_id, todo.title, todo.completed
                    ),
                );
            },
            move |completion| {
                if let Completion::Failure(err) = completion {
                    record(&completions, format!("Unable to retrieve todo: {err}"));
                }
                let _ = tx.send(());
            },
        )
        .store_in(&mut bag);

    await_done(&done, 1, config.fetch_latency + GRACE);
    lines(&transcript)
}

// ---------------------------------------------------------------------------
// Sharing
// ---------------------------------------------------------------------------

fn report_into(
    transcript: &Transcript,
    tag: &'static str,
    tx: mpsc::Sender<()>,
) -> (
    impl FnMut(usize) + Send + 'static,
    impl FnMut(Completion<ServiceError>) + Send + 'static,
) {
    let (values, completions) = (Arc::clone(transcript), Arc::clone(transcript));
    (
        move |size| record(&values, format!("{tag} received {size} bytes")),
        move |completion: Completion<ServiceError>| {
            match completion {
                Completion::Finished => record(&completions, format!("{tag} finished")),
                Completion::Failure(err) => record(&completions, format!("{tag} failed: {err}")),
            }
            let _ = tx.send(());
        },
    )
}

fn sharing(config: &DemoConfig) -> Vec<String> {
    let fetcher = mock_fetcher(config);
    let transcript = Transcript::default();
    let (tx, done) = mpsc::channel();
    let mut bag = CancelBag::new();

    let shared = fetcher
        .fetch(&Request::get(PAGE_URL))
        .map_error(ServiceError::from)
        .map(|body| body.len())
        .log_events("shared")
        .share();

    for tag in ["sub1", "sub2"] {
        let (on_value, on_completion) = report_into(&transcript, tag, tx.clone());
        shared
            .clone()
            .sink(on_value, on_completion)
            .store_in(&mut bag);
    }

    await_done(&done, 2, config.fetch_latency + GRACE);
    let mut out = lines(&transcript);
    out.push(format!("requests sent: {}", fetcher.request_count()));
    out
}

// ---------------------------------------------------------------------------
// Multicast
// ---------------------------------------------------------------------------

fn multicast(config: &DemoConfig) -> Vec<String> {
    let fetcher = mock_fetcher(config);
    let transcript = Transcript::default();
    let (tx, done) = mpsc::channel();
    let mut bag = CancelBag::new();

    let multicast = fetcher
        .fetch(&Request::get(PAGE_URL))
        .map_error(ServiceError::from)
        .map(|body| body.len())
        .log_events("multi")
        .multicast(PassthroughSubject::new());

    for tag in ["mult1", "mult2"] {
        let (on_value, on_completion) = report_into(&transcript, tag, tx.clone());
        multicast
            .clone()
            .sink(on_value, on_completion)
            .store_in(&mut bag);
    }
    record(
        &transcript,
        format!("requests before connect: {}", fetcher.request_count()),
    );
    let _connection = multicast.connect();

    await_done(&done, 2, config.fetch_latency + GRACE);
    let mut out = lines(&transcript);
    out.push(format!("requests sent: {}", fetcher.request_count()));
    out
}

// ---------------------------------------------------------------------------
// map vs try_map
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameError {
    TooShort(String),
    Invalid,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort(name) => write!(f, "name too short: {name}"),
            Self::Invalid => f.write_str("invalid name"),
        }
    }
}

impl std::error::Error for NameError {}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn describe(transcript: &Transcript, completion: Completion<NameError>) {
    let line = match completion {
        Completion::Finished => "Error example finished".to_string(),
        Completion::Failure(NameError::Invalid) => "Got error invalid".to_string(),
        Completion::Failure(NameError::TooShort(message)) => {
            format!("Got error name too short. {message}")
        }
    };
    record(transcript, line);
}

fn map_vs_try_map() -> Vec<String> {
    let transcript = Transcript::default();

    let (values, completions) = (Arc::clone(&transcript), Arc::clone(&transcript));
    let _mapped = Just::new("Adam".to_string())
        .set_failure_type::<NameError>()
        .map(|name| name + " Ahrens")
        .sink(
            move |value| record(&values, format!("Error example received {value}")),
            move |completion| describe(&completions, completion),
        );

    // try_map widens to a boxed error; map_error narrows it back, mapping
    // anything unexpected to `Invalid`.
    let (values, completions) = (Arc::clone(&transcript), Arc::clone(&transcript));
    let _failed = Just::new("Hello".to_string())
        .set_failure_type::<NameError>()
        .try_map(|name| Err::<String, BoxError>(Box::new(NameError::TooShort(name))))
        .map_error(|err: BoxError| {
            err.downcast::<NameError>()
                .map_or(NameError::Invalid, |err| *err)
        })
        .sink(
            move |value| record(&values, format!("Error example received {value}")),
            move |completion| describe(&completions, completion),
        );

    lines(&transcript)
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

fn checkout(config: &DemoConfig) -> Vec<String> {
    let transcript = Transcript::default();
    let scheduler = match ThreadScheduler::spawn(ThreadSchedulerConfig::default()) {
        Ok(scheduler) => Arc::new(scheduler),
        Err(err) => {
            return vec![format!("cannot start timer thread: {err}")];
        }
    };
    let fetcher: Arc<dyn Fetcher> = Arc::new(mock_fetcher(config));
    let model = CheckoutViewModel::new(
        CheckoutInfo::sample(),
        CurrencyService::new(fetcher, config.endpoint.clone()),
        scheduler,
        config,
    );

    let (tx, updates) = mpsc::channel();
    let _watch = model.is_updating().subscribe(move |updating| {
        let _ = tx.send(*updating);
    });

    record(&transcript, format!("{} at {}", model.info().model, model.total_price().get()));
    let target = config.currency;
    for typed in Currency::ALL.into_iter().filter(|c| *c != target).chain([target]) {
        model.select_currency(typed);
    }
    record(&transcript, format!("selected {target} after a burst of changes"));

    // Settling raises the flag; the rate reply lowers it.
    let deadline = config.debounce + config.fetch_latency + GRACE;
    loop {
        match updates.recv_timeout(deadline) {
            Ok(false) if model.quote().get().currency == target => break,
            Ok(_) => {}
            Err(_) => {
                record(&transcript, "rate did not arrive in time".to_string());
                break;
            }
        }
    }

    let quote = model.quote().get();
    record(&transcript, format!("rate {} {}", quote.currency, quote.rate));
    record(&transcript, format!("base {}", model.base_price().get()));
    record(&transcript, format!("additions {}", model.additions_price().get()));
    for (name, price) in model.shipping_prices().get() {
        record(&transcript, format!("shipping {name}: {price}"));
    }
    record(&transcript, format!("total {}", model.total_price().get()));
    record(&transcript, format!("[{}]", model.checkout_button()));
    lines(&transcript)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant() -> DemoConfig {
        DemoConfig::default()
            .with_debounce(Duration::from_millis(20))
            .with_fetch_latency(Duration::ZERO)
    }

    #[test]
    fn names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>(), Ok(scenario));
        }
        assert_eq!("MAP_VS_TRY_MAP".parse::<Scenario>(), Ok(Scenario::MapVsTryMap));
        assert!("nope".parse::<Scenario>().is_err());
    }

    #[test]
    fn backpressure_withholds_six_through_nine() {
        assert_eq!(
            Scenario::Backpressure.run(&instant()),
            vec![
                "Received value 1",
                "Received value 2",
                "Received value 3",
                "Received value 4",
                "Received value 5",
                "Received completion",
            ]
        );
    }

    #[test]
    fn map_vs_try_map_transcript() {
        assert_eq!(
            Scenario::MapVsTryMap.run(&instant()),
            vec![
                "Error example received Adam Ahrens",
                "Error example finished",
                "Got error name too short. Hello",
            ]
        );
    }

    #[test]
    fn decode_reports_todo() {
        let lines = Scenario::Decode.run(&instant());
        assert_eq!(
            lines,
            vec!["Got todo #1 for user 1: \"delectus aut autem\" (completed: false)"]
        );
    }

    #[test]
    fn instant_share_reaches_only_the_first_subscriber() {
        // With no latency the fetch finishes while the first subscriber
        // connects; the second attaches to a finished hub.
        let lines = Scenario::Sharing.run(&instant());
        assert_eq!(
            lines,
            vec![
                "sub1 received 32 bytes",
                "sub1 finished",
                "sub2 finished",
                "requests sent: 1",
            ]
        );
    }

    #[test]
    fn multicast_waits_for_connect() {
        let lines = Scenario::Multicast.run(&instant());
        assert_eq!(
            lines,
            vec![
                "requests before connect: 0",
                "mult1 received 32 bytes",
                "mult2 received 32 bytes",
                "mult1 finished",
                "mult2 finished",
                "requests sent: 1",
            ]
        );
    }
}
