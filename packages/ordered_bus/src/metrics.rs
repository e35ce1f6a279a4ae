//! Metrics for the event bus.
//!
//! The events are thread-local, so each observation only touches data owned by the observing
//! thread. Collect them with `nm::Report::collect()`.

use nm::{Event, Magnitude};

/// Histogram buckets for the number of events moved into one batch.
const BATCH_SIZE_BUCKETS: &[Magnitude] = &[0, 1, 10, 100, 1_000, 10_000, 100_000, 1_000_000];

/// Histogram buckets for the time spent ordering one batch, in milliseconds.
const SORT_DURATION_MS_BUCKETS: &[Magnitude] = &[0, 1, 2, 5, 10, 20, 50, 100, 200, 500];

thread_local! {
    pub(crate) static EVENTS_SUBMITTED: Event = Event::builder()
        .name("ordered_bus_events_submitted")
        .build();

    pub(crate) static EVENTS_REJECTED: Event = Event::builder()
        .name("ordered_bus_events_rejected")
        .build();

    /// The magnitude is the number of events in the batch.
    pub(crate) static BATCH_SIZE: Event = Event::builder()
        .name("ordered_bus_batch_size")
        .histogram(BATCH_SIZE_BUCKETS)
        .build();

    pub(crate) static SORT_DURATION_MS: Event = Event::builder()
        .name("ordered_bus_sort_duration_ms")
        .histogram(SORT_DURATION_MS_BUCKETS)
        .build();

    pub(crate) static EVENTS_DISPATCHED: Event = Event::builder()
        .name("ordered_bus_events_dispatched")
        .build();

    /// Handler entries found pointing at a handler object that no longer exists.
    pub(crate) static HANDLERS_PRUNED: Event = Event::builder()
        .name("ordered_bus_handlers_pruned")
        .build();
}
