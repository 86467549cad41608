//! Benchmarks for value delivery.
//!
//! Covers the per-value cost of the outlet drain loop, a pass-through
//! operator chain, and hub fan-out.
//!
//! Run with: cargo bench -p ripple-core --bench delivery_bench

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ripple_core::{Never, PassthroughSubject, PublisherExt, Sequence};

// =============================================================================
// Cold source
// =============================================================================

fn bench_sequence(c: &mut Criterion) {
    let mut group = c.benchmark_group("delivery/sequence");

    for len in [100u64, 10_000] {
        group.bench_with_input(BenchmarkId::new("unbounded_sink", len), &len, |b, &len| {
            b.iter(|| {
                let sum = Arc::new(AtomicU64::new(0));
                let s = Arc::clone(&sum);
                let _guard = Sequence::new(0..len).sink_values(move |v| {
                    s.fetch_add(v, Ordering::Relaxed);
                });
                black_box(sum.load(Ordering::Relaxed))
            });
        });

        group.bench_with_input(BenchmarkId::new("map_dedup_chain", len), &len, |b, &len| {
            b.iter(|| {
                let count = Arc::new(AtomicU64::new(0));
                let c = Arc::clone(&count);
                let _guard = Sequence::new(0..len)
                    .map(|v| v / 2)
                    .remove_duplicates()
                    .sink_values(move |_| {
                        c.fetch_add(1, Ordering::Relaxed);
                    });
                black_box(count.load(Ordering::Relaxed))
            });
        });
    }

    group.finish();
}

// =============================================================================
// Hub fan-out
// =============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("delivery/fan_out");

    for subscribers in [1usize, 8, 64] {
        group.bench_with_input(
            BenchmarkId::new("subject_send", subscribers),
            &subscribers,
            |b, &subscribers| {
                let subject = PassthroughSubject::<u64, Never>::new();
                let total = Arc::new(AtomicU64::new(0));
                let guards: Vec<_> = (0..subscribers)
                    .map(|_| {
                        let t = Arc::clone(&total);
                        subject.clone().sink_values(move |v| {
                            t.fetch_add(v, Ordering::Relaxed);
                        })
                    })
                    .collect();
                b.iter(|| subject.send(black_box(1)));
                drop(guards);
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_sequence, bench_fan_out);
criterion_main!(benches);
