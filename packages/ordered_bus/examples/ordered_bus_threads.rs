//! Several producer threads submit events while a coordinator thread moves them to processors,
//! each of which dispatches on its own thread.
//!
//! Run with `RUST_LOG=ordered_bus=debug` to see the bus lifecycle logged.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use ordered_bus::{EventBus, EventRegistry, ProcessorId};
use tracing_subscriber::EnvFilter;

const PRODUCERS: u64 = 4;
const EVENTS_PER_PRODUCER: u64 = 10_000;
const CONSUMERS: usize = 2;

struct Measurement {
    producer: u64,
    value: u64,
}

/// Verifies that each producer's events arrive in the order that producer submitted them.
struct OrderCheck {
    last_seen: Vec<AtomicU64>,
    received: AtomicU64,
}

impl OrderCheck {
    fn new() -> Self {
        Self {
            last_seen: (0..PRODUCERS).map(|_| AtomicU64::new(0)).collect(),
            received: AtomicU64::new(0),
        }
    }

    fn on_measurement(&self, measurement: &Measurement) {
        let last = &self.last_seen[measurement.producer as usize];

        assert!(
            measurement.value > last.load(Ordering::Relaxed),
            "events from producer {} arrived out of order",
            measurement.producer
        );

        last.store(measurement.value, Ordering::Relaxed);
        self.received.fetch_add(1, Ordering::Relaxed);
    }
}

fn main() -> ordered_bus::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let registry = EventRegistry::builder().register::<Measurement>().build();
    let bus = Arc::new(EventBus::builder(registry).parallel_sort_threshold(1024).build()?);

    let consumers: Vec<ProcessorId> = (0..CONSUMERS).map(|_| bus.get_processor()).collect();
    let producers: Vec<ProcessorId> = (0..PRODUCERS).map(|_| bus.get_processor()).collect();
    let producing = Arc::new(AtomicBool::new(true));

    let producer_threads: Vec<_> = producers
        .iter()
        .zip(0..)
        .map(|(&via, producer)| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for value in 1..=EVENTS_PER_PRODUCER {
                    bus.submit(via, Measurement { producer, value })
                        .expect("the processor and event type are both known");
                }
            })
        })
        .collect();

    let consumer_threads: Vec<_> = consumers
        .iter()
        .map(|&processor| {
            let bus = Arc::clone(&bus);
            let producing = Arc::clone(&producing);
            thread::spawn(move || {
                let check = Arc::new(OrderCheck::new());
                bus.subscribe(processor, &check, OrderCheck::on_measurement)
                    .expect("the processor and event type are both known");

                loop {
                    let still_producing = producing.load(Ordering::Acquire);
                    bus.process_events(processor).expect("the processor is known");

                    if !still_producing {
                        break;
                    }

                    thread::sleep(Duration::from_millis(1));
                }

                check.received.load(Ordering::Relaxed)
            })
        })
        .collect();

    while producer_threads.iter().any(|t| !t.is_finished()) {
        bus.move_to_processors();
        thread::sleep(Duration::from_millis(1));
    }

    for thread in producer_threads {
        thread.join().expect("producer thread panicked");
    }

    while bus.pending_events() > 0 {
        bus.move_to_processors();
    }

    producing.store(false, Ordering::Release);

    for (index, thread) in consumer_threads.into_iter().enumerate() {
        let received = thread.join().expect("consumer thread panicked");
        println!("consumer {index} received {received} events in order");
    }

    Ok(())
}
