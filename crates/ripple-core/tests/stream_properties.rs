//! End-to-end behavior of the public stream API.
//!
//! Each test drives a pipeline through `ripple_core`'s public surface only,
//! with a recording subscriber that controls its own demand.

use std::sync::{Arc, Mutex};

use ripple_core::{
    CancelBag, Completion, Demand, ManualScheduler, Never, PassthroughSubject, Publisher,
    PublisherExt, Sequence, Subscriber, SubscriptionHandle, SubscriptionSlot,
};
use tracing::Level;
use web_time::Duration;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(Level::DEBUG)
        .try_init();
}

#[derive(Debug, Default)]
struct Events<T, E> {
    values: Vec<T>,
    completion: Option<Completion<E>>,
}

type Shared<T, E> = Arc<Mutex<Events<T, E>>>;

/// Requests `initial`, then answers every value with `reply(value)`.
struct Recorder<T, E> {
    initial: Demand,
    reply: fn(&T) -> Demand,
    events: Shared<T, E>,
    slot: SubscriptionSlot,
}

impl<T: Send + 'static, E: Send + 'static> Recorder<T, E> {
    fn new(initial: Demand, reply: fn(&T) -> Demand) -> (Self, Shared<T, E>, SubscriptionSlot) {
        let events = Arc::new(Mutex::new(Events {
            values: Vec::new(),
            completion: None,
        }));
        let slot = SubscriptionSlot::new();
        (
            Self {
                initial,
                reply,
                events: Arc::clone(&events),
                slot: slot.clone(),
            },
            events,
            slot,
        )
    }
}

impl<T: Send + 'static, E: Send + 'static> Subscriber for Recorder<T, E> {
    type Input = T;
    type Failure = E;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.slot.set(Arc::clone(&subscription));
        subscription.request(self.initial);
    }

    fn receive(&mut self, input: T) -> Demand {
        let more = (self.reply)(&input);
        self.events.lock().unwrap().values.push(input);
        more
    }

    fn receive_completion(&mut self, completion: Completion<E>) {
        let mut events = self.events.lock().unwrap();
        assert!(events.completion.is_none(), "second terminal signal");
        events.completion = Some(completion);
    }
}

#[test]
fn backpressure_tops_up_demand_from_inside_receive() {
    init_logging();
    let (recorder, events, slot) =
        Recorder::<i32, Never>::new(Demand::max(2), |v| if v % 2 == 0 { Demand::max(1) } else { Demand::NONE });
    Sequence::new(1..=9).subscribe(recorder);
    assert_eq!(events.lock().unwrap().values, vec![1, 2, 3]);

    slot.request(Demand::max(1));
    assert_eq!(events.lock().unwrap().values, vec![1, 2, 3, 4, 5]);
    assert!(events.lock().unwrap().completion.is_none());
}

#[test]
fn zero_demand_delivers_nothing() {
    let (recorder, events, _slot) = Recorder::<i32, Never>::new(Demand::NONE, |_| Demand::NONE);
    Sequence::new(vec![1, 2, 3]).subscribe(recorder);
    assert!(events.lock().unwrap().values.is_empty());
}

#[test]
fn share_has_no_replay() {
    let subject = PassthroughSubject::<&str, Never>::new();
    let shared = subject.clone().share();
    let (first, first_events, _a) = Recorder::new(Demand::UNBOUNDED, |_| Demand::NONE);
    shared.subscribe(first);
    subject.send("one");
    subject.send("two");
    let (second, second_events, _b) = Recorder::new(Demand::UNBOUNDED, |_| Demand::NONE);
    shared.subscribe(second);
    subject.send("three");

    assert_eq!(first_events.lock().unwrap().values, vec!["one", "two", "three"]);
    assert_eq!(second_events.lock().unwrap().values, vec!["three"]);
}

#[test]
fn multicast_is_gated_by_connect() {
    let multicast = Sequence::new(vec![10, 20])
        .set_failure_type::<&str>()
        .multicast(PassthroughSubject::new());
    let (a, a_events, _sa) = Recorder::new(Demand::UNBOUNDED, |_| Demand::NONE);
    let (b, b_events, _sb) = Recorder::new(Demand::UNBOUNDED, |_| Demand::NONE);
    multicast.subscribe(a);
    multicast.subscribe(b);
    assert!(a_events.lock().unwrap().values.is_empty());
    assert!(b_events.lock().unwrap().values.is_empty());

    let _connection = multicast.connect();
    assert_eq!(a_events.lock().unwrap().values.first(), Some(&10));
    assert_eq!(b_events.lock().unwrap().values.first(), Some(&10));
    assert_eq!(a_events.lock().unwrap().completion, Some(Completion::Finished));
}

#[test]
fn try_map_stops_at_first_error_despite_demand() {
    let (recorder, events, slot) = Recorder::<i32, String>::new(Demand::UNBOUNDED, |_| Demand::NONE);
    Sequence::new(vec![1, 2, 3])
        .set_failure_type::<String>()
        .try_map(|v| if v == 2 { Err("second input".to_string()) } else { Ok(v) })
        .subscribe(recorder);
    slot.request(Demand::max(10));
    let events = events.lock().unwrap();
    assert_eq!(events.values, vec![1]);
    assert_eq!(events.completion, Some(Completion::Failure("second input".to_string())));
}

#[test]
fn cancel_is_idempotent_and_request_after_cancel_is_inert() {
    let subject = PassthroughSubject::<i32, Never>::new();
    let (recorder, events, slot) = Recorder::new(Demand::max(1), |_| Demand::NONE);
    subject.subscribe(recorder);
    slot.cancel();
    slot.cancel();
    slot.request(Demand::max(5));
    subject.send(1);
    assert!(events.lock().unwrap().values.is_empty());
    assert_eq!(subject.subscriber_count(), 0);
}

#[test]
fn remove_duplicates_example() {
    let (recorder, events, _slot) = Recorder::<i32, Never>::new(Demand::UNBOUNDED, |_| Demand::NONE);
    Sequence::new(vec![1, 1, 2, 2, 2, 3, 1]).remove_duplicates().subscribe(recorder);
    assert_eq!(events.lock().unwrap().values, vec![1, 2, 3, 1]);
}

#[test]
fn remove_duplicates_keeps_bounded_demand_honest() {
    let (recorder, events, slot) = Recorder::<i32, Never>::new(Demand::max(2), |_| Demand::NONE);
    Sequence::new(vec![1, 1, 1, 2, 3]).remove_duplicates().subscribe(recorder);
    assert_eq!(events.lock().unwrap().values, vec![1, 2]);
    slot.request(Demand::max(1));
    assert_eq!(events.lock().unwrap().values, vec![1, 2, 3]);
}

#[test]
fn typing_pipeline_debounces_dedups_and_shares() {
    init_logging();
    let scheduler = ManualScheduler::new();
    let input = PassthroughSubject::<&str, Never>::new();
    let settled = input
        .clone()
        .debounce(Duration::from_millis(300), Arc::new(scheduler.clone()))
        .remove_duplicates()
        .share();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut bag = CancelBag::new();
    for tag in ["a", "b"] {
        let s = Arc::clone(&seen);
        settled
            .clone()
            .sink_values(move |v| s.lock().unwrap().push(format!("{tag}:{v}")))
            .store_in(&mut bag);
    }

    input.send("e");
    input.send("eu");
    scheduler.advance(Duration::from_millis(100));
    input.send("eur");
    scheduler.advance(Duration::from_millis(300));
    input.send("eur");
    scheduler.advance(Duration::from_millis(300));
    assert_eq!(*seen.lock().unwrap(), vec!["a:eur", "b:eur"]);

    bag.cancel_all();
    input.send("gbp");
    scheduler.advance(Duration::from_millis(300));
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn merged_status_flags() {
    let starts = PassthroughSubject::<bool, Never>::new();
    let ends = PassthroughSubject::<bool, Never>::new();
    let flags = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::clone(&flags);
    let _guard = starts
        .clone()
        .merge(ends.clone())
        .sink_values(move |v| f.lock().unwrap().push(v));
    starts.send(true);
    ends.send(false);
    starts.send(true);
    assert_eq!(*flags.lock().unwrap(), vec![true, false, true]);
}
