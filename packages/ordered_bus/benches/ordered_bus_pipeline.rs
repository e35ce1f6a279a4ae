#![expect(missing_docs, reason = "benchmarks")]

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use many_cpus::ProcessorSetBuilder;
use new_zealand::nz;
use ordered_bus::{EventBus, EventRegistry, bucketed_sort};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

struct Sample(u64);

#[derive(Default)]
struct Sum {
    total: AtomicU64,
}

impl Sum {
    fn on_sample(&self, sample: &Sample) {
        self.total.fetch_add(sample.0, Ordering::Relaxed);
    }
}

fn bus(parallel_sort_threshold: usize) -> EventBus {
    EventBus::builder(EventRegistry::builder().register::<Sample>().build())
        .parallel_sort_threshold(parallel_sort_threshold)
        .build()
        .unwrap()
}

fn entrypoint(c: &mut Criterion) {
    // Pin the main thread to a single processor to eliminate OS migration impact.
    let one_processor = ProcessorSetBuilder::new().take(nz!(1)).unwrap();
    one_processor.pin_current_thread_to();

    let mut g = c.benchmark_group("ordered_bus");

    for (name, events, threshold) in [
        ("round_trip_100_inline", 100, usize::MAX),
        ("round_trip_10k_inline", 10_000, usize::MAX),
        ("round_trip_10k_parallel", 10_000, 0),
    ] {
        g.bench_function(name, |b| {
            let bus = bus(threshold);
            let processor = bus.get_processor();
            let sum = Arc::new(Sum::default());
            bus.subscribe(processor, &sum, Sum::on_sample).unwrap();

            b.iter_custom(|iterations| {
                let start = Instant::now();

                for _ in 0..iterations {
                    for value in 0..events {
                        bus.submit(processor, Sample(value)).unwrap();
                    }

                    black_box(bus.move_to_processors());
                    black_box(bus.process_events(processor).unwrap());
                }

                start.elapsed()
            });
        });
    }

    g.bench_function("bucketed_sort_10k", |b| {
        let mut pairs: Vec<(u64, u64)> = (0..10_000).map(|s| (s, s)).collect();
        pairs.shuffle(&mut StdRng::seed_from_u64(1));

        b.iter_batched(
            || pairs.clone(),
            |pairs| black_box(bucketed_sort(pairs, 4, 32)),
            BatchSize::SmallInput,
        );
    });

    g.finish();
}

criterion_group!(benches, entrypoint);
criterion_main!(benches);
