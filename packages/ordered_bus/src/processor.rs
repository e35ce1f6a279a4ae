use std::collections::VecDeque;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

use crate::metrics::{EVENTS_DISPATCHED, HANDLERS_PRUNED};
use crate::{EventTypeId, HandlerEntry, HandlerKey, HandlerTable, ProducerToken, SharedBatch};

/// Identifies one processor of an [`EventBus`][crate::EventBus].
///
/// Processors are numbered from zero in the order they were created with
/// [`EventBus::get_processor()`][crate::EventBus::get_processor]. An identity is only meaningful
/// for the bus that issued it.
#[derive(Clone, Copy, Debug, derive_more::Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("processor #{_0}")]
pub struct ProcessorId(usize);

impl ProcessorId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// The position of this processor in the order of creation.
    #[must_use]
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A handler table plus an inbox of ordered batches waiting to be dispatched.
///
/// Any thread may deliver batches into the inbox. Everything else (subscribing, unsubscribing
/// and dispatching) is meant to happen on one thread at a time; overlapping calls panic.
#[derive(Debug)]
pub(crate) struct EventProcessor {
    id: ProcessorId,

    /// Events submitted "on behalf of" this processor enter the intake queue through this token.
    producer: ProducerToken,

    inbox_tx: Sender<SharedBatch>,
    inbox_rx: Receiver<SharedBatch>,

    local: Mutex<LocalState>,
}

#[derive(Debug)]
struct LocalState {
    handlers: HandlerTable,

    /// Batches taken out of the inbox, oldest first.
    pending: VecDeque<SharedBatch>,

    /// Index of the next event to dispatch in the front batch of `pending`.
    cursor: usize,
}

impl EventProcessor {
    pub(crate) fn new(id: ProcessorId, event_type_count: usize, producer: ProducerToken) -> Self {
        let (inbox_tx, inbox_rx) = channel::unbounded();

        Self {
            id,
            producer,
            inbox_tx,
            inbox_rx,
            local: Mutex::new(LocalState {
                handlers: HandlerTable::new(event_type_count),
                pending: VecDeque::new(),
                cursor: 0,
            }),
        }
    }

    pub(crate) fn producer(&self) -> &ProducerToken {
        &self.producer
    }

    pub(crate) fn subscribe(&self, event_type: EventTypeId, entry: HandlerEntry) {
        self.lock_local("subscribe").handlers.insert(event_type, entry);
    }

    pub(crate) fn unsubscribe(&self, key: HandlerKey) -> usize {
        let mut local = self.lock_local("unsubscribe");
        let removed = local.handlers.remove(key);

        trace!(
            processor = %self.id,
            removed,
            remaining = local.handlers.len(),
            "handler unsubscribed"
        );

        removed
    }

    /// Appends a batch to the inbox. Empty batches are ignored.
    pub(crate) fn add_events(&self, batch: SharedBatch) {
        if batch.is_empty() {
            return;
        }

        trace!(processor = %self.id, events = batch.len(), "batch delivered");

        self.inbox_tx
            .send(batch)
            .expect("the inbox receiver lives as long as the processor itself");
    }

    /// Dispatches every event delivered so far, oldest first, and returns how many were
    /// dispatched.
    ///
    /// If a handler panics, the panic reaches the caller and the event it was handling counts as
    /// delivered. The next call resumes with the event after it.
    pub(crate) fn process_events(&self) -> usize {
        let mut local = self.lock_local("process events");
        let LocalState {
            handlers,
            pending,
            cursor,
        } = &mut *local;

        pending.extend(self.inbox_rx.try_iter());

        let mut dispatched = 0_usize;
        let mut all_alive = true;

        while let Some(batch) = pending.front() {
            match batch.get(*cursor) {
                Some(envelope) => {
                    *cursor = cursor.wrapping_add(1);
                    all_alive &= handlers.dispatch(envelope);
                    dispatched = dispatched.wrapping_add(1);
                }
                None => {
                    // Releases our handle on the batch as soon as we are done with it.
                    pending.pop_front();
                    *cursor = 0;
                }
            }
        }

        if !all_alive {
            let pruned = handlers.prune_dropped();
            HANDLERS_PRUNED.with(|e| e.batch(pruned).observe_once());
        }

        if dispatched > 0 {
            EVENTS_DISPATCHED.with(|e| e.batch(dispatched).observe_once());
            trace!(processor = %self.id, events = dispatched, "events dispatched");
        }

        dispatched
    }

    /// Events delivered to this processor but not yet dispatched.
    #[cfg(test)]
    pub(crate) fn undispatched(&self) -> usize {
        let mut local = self.lock_local("count undispatched events");
        let LocalState { pending, cursor, .. } = &mut *local;

        pending.extend(self.inbox_rx.try_iter());

        pending
            .iter()
            .map(SharedBatch::len)
            .sum::<usize>()
            .wrapping_sub(*cursor)
    }

    fn lock_local(&self, operation: &str) -> MutexGuard<'_, LocalState> {
        self.local.try_lock().unwrap_or_else(|| {
            panic!(
                "cannot {operation} on {}: it is already in use by another call, possibly on another thread or in a handler it is dispatching to",
                self.id
            )
        })
    }
}
