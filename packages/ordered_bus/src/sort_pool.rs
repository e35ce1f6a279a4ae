use std::mem;
use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use many_cpus::ProcessorSet;
use parking_lot::Mutex;
use tracing::debug;

use crate::radix_sort;

type Job = Box<dyn FnOnce() + Send>;

/// Persistent worker threads that radix sort buckets in parallel.
///
/// One thread is spawned per processor in the provided processor set and pinned to it. Workers
/// pull jobs from a shared channel, so whichever worker is free picks up the next job.
///
/// # Lifecycle
///
/// Dropping the pool waits for all worker threads to finish their current job and exit.
#[derive(Debug)]
pub(crate) struct SortPool {
    job_tx: Option<Sender<Job>>,
    join_handles: Vec<JoinHandle<()>>,
    thread_count: NonZero<usize>,
}

impl SortPool {
    pub(crate) fn new(processors: &ProcessorSet) -> Self {
        let (job_tx, job_rx) = channel::unbounded::<Job>();

        let join_handles = processors
            .spawn_threads(move |_| worker_entrypoint(&job_rx))
            .into_vec();

        let thread_count = NonZero::new(join_handles.len())
            .expect("guarded by fact that ProcessorSet is never empty");

        debug!(threads = thread_count.get(), "sort pool started");

        Self {
            job_tx: Some(job_tx),
            join_handles,
            thread_count,
        }
    }

    #[cfg(test)]
    pub(crate) fn thread_count(&self) -> NonZero<usize> {
        self.thread_count
    }

    /// Radix sorts every bucket, spreading buckets over the workers, and returns them in their
    /// original order. Blocks until every bucket is sorted.
    pub(crate) fn sort_buckets<T>(
        &self,
        buckets: Vec<Vec<(T, u64)>>,
        radix: usize,
    ) -> Vec<Vec<(T, u64)>>
    where
        T: Send + 'static,
    {
        let shared: Arc<[Mutex<Vec<(T, u64)>>]> = buckets.into_iter().map(Mutex::new).collect();
        let next_bucket = Arc::new(AtomicUsize::new(0));

        let workers = self.thread_count.get().min(shared.len());
        let mut done_rxs = Vec::with_capacity(workers);

        for _ in 0..workers {
            let (done_tx, done_rx) = oneshot::channel::<()>();
            done_rxs.push(done_rx);

            let shared = Arc::clone(&shared);
            let next_bucket = Arc::clone(&next_bucket);

            self.job_tx
                .as_ref()
                .expect("job sender only goes away when the pool is dropped")
                .send(Box::new(move || {
                    // Relaxed is enough: each index only needs to be claimed once, and the
                    // bucket contents are synchronized by their mutexes.
                    while let Some(bucket) =
                        shared.get(next_bucket.fetch_add(1, Ordering::Relaxed))
                    {
                        radix_sort(&mut bucket.lock(), radix);
                    }

                    drop(shared);

                    done_tx
                        .send(())
                        .expect("receiver must still exist - the caller waits for every worker");
                }))
                .expect("worker threads must still exist - the pool cannot sort without workers");
        }

        for done_rx in done_rxs {
            done_rx
                .recv()
                .expect("sort worker failed to report completion - did it panic?");
        }

        shared
            .iter()
            .map(|bucket| mem::take(&mut *bucket.lock()))
            .collect()
    }
}

impl Drop for SortPool {
    #[cfg_attr(test, mutants::skip)] // Impractical to test that stuff stops happening.
    fn drop(&mut self) {
        if thread::panicking() {
            // We are probably in a dirty state already and joining may hide the original panic.
            return;
        }

        // Disconnecting the channel is the shutdown signal.
        drop(self.job_tx.take());

        for handle in self.join_handles.drain(..) {
            handle
                .join()
                .expect("sort worker threads run no user code and never panic");
        }

        debug!("sort pool stopped");
    }
}

#[cfg_attr(test, mutants::skip)] // Impractical to test that things do not happen when the worker is missing.
fn worker_entrypoint(job_rx: &Receiver<Job>) {
    while let Ok(job) = job_rx.recv() {
        job();
    }
}

#[cfg(not(miri))] // ProcessorSet is not supported under Miri.
#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use many_cpus::ProcessorSetBuilder;
    use new_zealand::nz;

    use super::*;

    fn one_processor() -> ProcessorSet {
        ProcessorSetBuilder::new().take(nz!(1)).unwrap()
    }

    #[test]
    fn sorts_every_bucket_in_place() {
        let pool = SortPool::new(&one_processor());
        assert_eq!(pool.thread_count().get(), 1);

        let buckets = vec![
            vec![("b", 2), ("a", 1)],
            vec![],
            vec![("d", 9), ("c", 8), ("e", 10)],
        ];

        let sorted = pool.sort_buckets(buckets, 32);

        let order: Vec<Vec<&str>> = sorted
            .into_iter()
            .map(|bucket| bucket.into_iter().map(|(item, _)| item).collect())
            .collect();

        assert_eq!(order, vec![vec!["a", "b"], vec![], vec!["c", "d", "e"]]);
    }

    #[test]
    fn all_processors_share_the_work() {
        let processors = ProcessorSetBuilder::new().take_all().unwrap();
        let pool = SortPool::new(&processors);

        let buckets: Vec<Vec<(u64, u64)>> = (0..64_u64)
            .map(|bucket| (0..100_u64).rev().map(|i| (bucket * 100 + i, i)).collect())
            .collect();

        let sorted = pool.sort_buckets(buckets, 10);

        assert_eq!(sorted.len(), 64);
        for bucket in sorted {
            let keys: Vec<_> = bucket.iter().map(|(_, key)| *key).collect();
            assert_eq!(keys, (0..100).collect::<Vec<_>>());
        }
    }

    #[test]
    fn pool_can_be_reused() {
        let pool = SortPool::new(&one_processor());

        for round in 0..3_u64 {
            let sorted = pool.sort_buckets(vec![vec![((), round + 1), ((), 0)]], 2);
            assert_eq!(sorted[0][0].1, 0);
        }
    }
}
