use std::sync::Arc;

use crate::EventEnvelope;

/// A read-only run of events in global submission order, shared by every processor that
/// received it.
///
/// Cloning a batch clones a handle, not the events. The events are dropped together when the
/// last handle is dropped, which happens once every processor holding the batch has dispatched
/// it (or has itself been dropped).
#[derive(Clone, Debug)]
pub(crate) struct SharedBatch {
    events: Arc<[EventEnvelope]>,
}

impl SharedBatch {
    pub(crate) fn new(events: Vec<EventEnvelope>) -> Self {
        Self {
            events: events.into(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    pub(crate) fn get(&self, index: usize) -> Option<&EventEnvelope> {
        self.events.get(index)
    }

    /// Number of live handles to this batch, including `self`.
    #[cfg(test)]
    pub(crate) fn handle_count(&self) -> usize {
        Arc::strong_count(&self.events)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::atomic::{self, AtomicUsize};

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::EventRegistry;

    assert_impl_all!(SharedBatch: Send, Sync, Clone);

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, atomic::Ordering::SeqCst);
        }
    }

    fn batch_of(count: usize, drops: &Arc<AtomicUsize>) -> SharedBatch {
        let registry = EventRegistry::builder().register::<DropCounter>().build();
        let id = registry.id_of::<DropCounter>().unwrap();

        SharedBatch::new(
            (0..count)
                .map(|_| EventEnvelope::new(id, DropCounter(Arc::clone(drops))))
                .collect(),
        )
    }

    #[test]
    fn events_freed_once_after_last_handle() {
        let drops = Arc::new(AtomicUsize::new(0));
        let batch = batch_of(3, &drops);

        let first = batch.clone();
        let second = batch.clone();
        assert_eq!(batch.handle_count(), 3);

        drop(batch);
        drop(first);
        assert_eq!(drops.load(atomic::Ordering::SeqCst), 0);

        drop(second);
        assert_eq!(drops.load(atomic::Ordering::SeqCst), 3);
    }

    #[test]
    fn indexing_stays_in_bounds() {
        let drops = Arc::new(AtomicUsize::new(0));
        let batch = batch_of(2, &drops);

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
        assert!(batch.get(1).is_some());
        assert!(batch.get(2).is_none());
    }
}
