//! Property-based invariant tests for demand accounting and delivery.
//!
//! **Demand arithmetic:**
//! 1. Addition is commutative and associative.
//! 2. `NONE` is the additive identity.
//! 3. `UNBOUNDED` absorbs every addition.
//! 4. `min_positive` never returns zero when some entry is positive.
//!
//! **Delivery:**
//! 5. A subscriber never receives more values than it has been granted
//!    (initial request plus every returned delta plus later requests).
//! 6. A finite source with enough demand delivers every item in order and
//!    finishes exactly once.
//! 7. `remove_duplicates` equals consecutive dedup.
//! 8. A multicast hub never delivers more to a downstream than it asked for.

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use ripple_core::{
    Completion, Demand, Never, PassthroughSubject, Publisher, PublisherExt, Sequence, Subscriber,
    SubscriptionHandle, SubscriptionSlot,
};

// ── Strategies ────────────────────────────────────────────────────────────

fn demand_strategy() -> impl Strategy<Value = Demand> {
    prop_oneof![
        1 => Just(Demand::UNBOUNDED),
        6 => (0usize..=1_000).prop_map(Demand::max),
    ]
}

// ── Recording subscriber ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Record {
    values: Vec<u32>,
    granted: u64,
    unbounded: bool,
    completions: usize,
    exceeded: bool,
}

impl Record {
    fn grant(&mut self, demand: Demand) {
        match demand.bounded() {
            Some(n) => self.granted += n as u64,
            None => self.unbounded = true,
        }
    }
}

struct Scripted {
    initial: Demand,
    replies: Vec<usize>,
    record: Arc<Mutex<Record>>,
    slot: SubscriptionSlot,
}

impl Subscriber for Scripted {
    type Input = u32;
    type Failure = Never;

    fn receive_subscription(&mut self, subscription: SubscriptionHandle) {
        self.slot.set(Arc::clone(&subscription));
        self.record.lock().unwrap().grant(self.initial);
        subscription.request(self.initial);
    }

    fn receive(&mut self, input: u32) -> Demand {
        let mut record = self.record.lock().unwrap();
        record.values.push(input);
        if !record.unbounded && record.values.len() as u64 > record.granted {
            record.exceeded = true;
        }
        let reply = self
            .replies
            .get(record.values.len() - 1)
            .copied()
            .map_or(Demand::NONE, Demand::max);
        record.grant(reply);
        reply
    }

    fn receive_completion(&mut self, _completion: Completion<Never>) {
        self.record.lock().unwrap().completions += 1;
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Demand arithmetic
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn addition_commutes_and_associates(a in demand_strategy(), b in demand_strategy(), c in demand_strategy()) {
        prop_assert_eq!(a + b, b + a);
        prop_assert_eq!((a + b) + c, a + (b + c));
    }

    #[test]
    fn none_is_identity(a in demand_strategy()) {
        prop_assert_eq!(a + Demand::NONE, a);
    }

    #[test]
    fn unbounded_absorbs(a in demand_strategy()) {
        prop_assert_eq!(a + Demand::UNBOUNDED, Demand::UNBOUNDED);
        prop_assert_eq!(Demand::UNBOUNDED.decrement(), Demand::UNBOUNDED);
    }

    #[test]
    fn min_positive_is_positive_when_possible(demands in proptest::collection::vec(demand_strategy(), 0..8)) {
        let min = Demand::min_positive(demands.iter().copied());
        let any_positive = demands.iter().any(|d| !d.is_none());
        prop_assert_eq!(!min.is_none(), any_positive);
        for d in demands.iter().filter(|d| !d.is_none()) {
            prop_assert!(min <= *d);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Delivery
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn delivered_never_exceeds_granted(
        len in 0u32..200,
        initial in 0usize..10,
        replies in proptest::collection::vec(0usize..3, 0..200),
        later in proptest::collection::vec(0usize..5, 0..5),
    ) {
        let record = Arc::new(Mutex::new(Record::default()));
        let slot = SubscriptionSlot::new();
        Sequence::new(0..len).subscribe(Scripted {
            initial: Demand::max(initial),
            replies,
            record: Arc::clone(&record),
            slot: slot.clone(),
        });
        for n in later {
            record.lock().unwrap().grant(Demand::max(n));
            slot.request(Demand::max(n));
        }
        let record = record.lock().unwrap();
        prop_assert!(!record.exceeded);
        prop_assert!(record.values.len() as u64 <= record.granted);
        let expected: Vec<u32> = (0..len).take(record.values.len()).collect();
        prop_assert_eq!(&record.values, &expected);
        prop_assert!(record.completions <= 1);
    }

    #[test]
    fn enough_demand_drains_source(items in proptest::collection::vec(any::<u32>(), 0..100)) {
        let record = Arc::new(Mutex::new(Record::default()));
        Sequence::new(items.clone()).subscribe(Scripted {
            initial: Demand::max(items.len()),
            replies: Vec::new(),
            record: Arc::clone(&record),
            slot: SubscriptionSlot::new(),
        });
        let record = record.lock().unwrap();
        prop_assert_eq!(&record.values, &items);
        prop_assert_eq!(record.completions, 1);
    }

    #[test]
    fn remove_duplicates_matches_dedup(items in proptest::collection::vec(0u8..4, 0..64)) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _guard = Sequence::new(items.clone())
            .remove_duplicates()
            .sink_values(move |v| s.lock().unwrap().push(v));
        let mut expected = items;
        expected.dedup();
        prop_assert_eq!(&*seen.lock().unwrap(), &expected);
    }

    #[test]
    fn hub_respects_each_downstream(
        demands in proptest::collection::vec(0usize..5, 1..5),
        sends in 0u32..30,
    ) {
        let subject = PassthroughSubject::<u32, Never>::new();
        let records: Vec<_> = demands
            .iter()
            .map(|&initial| {
                let record = Arc::new(Mutex::new(Record::default()));
                subject.clone().share().subscribe(Scripted {
                    initial: Demand::max(initial),
                    replies: Vec::new(),
                    record: Arc::clone(&record),
                    slot: SubscriptionSlot::new(),
                });
                (initial, record)
            })
            .collect();
        for v in 0..sends {
            subject.send(v);
        }
        for (initial, record) in records {
            let record = record.lock().unwrap();
            prop_assert!(!record.exceeded);
            prop_assert_eq!(record.values.len(), initial.min(sends as usize));
        }
    }
}
