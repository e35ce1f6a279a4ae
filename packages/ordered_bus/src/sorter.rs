use std::time::Instant;

use many_cpus::ProcessorSet;
use tracing::trace;

use crate::metrics::SORT_DURATION_MS;
use crate::radix::{Partition, concatenate, partition};
use crate::{SequencedEvent, SortPool, radix_sort};

/// Puts a drained set of events back into submission order.
///
/// Small sets are sorted on the calling thread. Larger ones are handed to a [`SortPool`],
/// which is only started the first time it is needed.
#[derive(Debug)]
pub(crate) struct BatchSorter {
    bucket_bits: u32,
    radix: usize,
    parallel_threshold: usize,
    pool: LazySortPool,
}

#[derive(Debug)]
enum LazySortPool {
    NotStarted(ProcessorSet),
    Running(SortPool),
}

impl BatchSorter {
    pub(crate) fn new(
        bucket_bits: u32,
        radix: usize,
        parallel_threshold: usize,
        processors: ProcessorSet,
    ) -> Self {
        Self {
            bucket_bits,
            radix,
            parallel_threshold,
            pool: LazySortPool::NotStarted(processors),
        }
    }

    pub(crate) fn order(&mut self, events: Vec<SequencedEvent>) -> Vec<SequencedEvent> {
        let started = Instant::now();
        let count = events.len();

        let pairs: Vec<(SequencedEvent, u64)> = events
            .into_iter()
            .map(|event| {
                let sequence = event.sequence;
                (event, sequence)
            })
            .collect();

        let ordered = match partition(pairs, self.bucket_bits) {
            Partition::Trivial(events) => events,
            Partition::Buckets(mut buckets) => {
                if count >= self.parallel_threshold {
                    let radix = self.radix;
                    buckets = self.pool().sort_buckets(buckets, radix);
                } else {
                    for bucket in &mut buckets {
                        radix_sort(bucket, self.radix);
                    }
                }

                concatenate(buckets)
            }
        };

        let elapsed = started.elapsed();
        SORT_DURATION_MS.with(|e| e.observe_millis(elapsed));
        trace!(events = count, ?elapsed, "batch ordered");

        ordered
    }

    fn pool(&mut self) -> &SortPool {
        if let LazySortPool::NotStarted(processors) = &self.pool {
            self.pool = LazySortPool::Running(SortPool::new(processors));
        }

        match &self.pool {
            LazySortPool::Running(pool) => pool,
            LazySortPool::NotStarted(_) => unreachable!("the pool was started just above"),
        }
    }
}
