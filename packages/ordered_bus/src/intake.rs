//! Multi-producer intake queue that every submitted event passes through.

use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;
use parking_lot::RwLock;

use crate::{Error, EventEnvelope, Result};

/// An event paired with the global sequence number it was stamped with at submission.
#[derive(Debug)]
pub(crate) struct SequencedEvent {
    pub(crate) envelope: EventEnvelope,
    pub(crate) sequence: u64,
}

type Lane = SegQueue<SequencedEvent>;

/// Unordered multi-producer, multi-consumer queue of sequenced events.
///
/// Each producer token owns a private lane, so producers holding different tokens never touch
/// the same queue. Within one lane, events come out in the order they were pushed; across lanes
/// there is no order at all, which is why consumers have to sort by sequence number.
#[derive(Debug)]
pub(crate) struct IntakeQueue {
    lanes: RwLock<Vec<Arc<Lane>>>,

    /// Events reserved but not yet released after being handed on.
    len: AtomicUsize,

    capacity: Option<NonZero<usize>>,
}

/// A producer's private lane into an [`IntakeQueue`].
#[derive(Debug)]
pub(crate) struct ProducerToken {
    lane: Arc<Lane>,
}

impl IntakeQueue {
    pub(crate) fn new(capacity: Option<NonZero<usize>>) -> Self {
        Self {
            lanes: RwLock::new(Vec::new()),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Opens a new lane and returns the token that pushes into it.
    pub(crate) fn producer_token(&self) -> ProducerToken {
        let lane = Arc::new(Lane::new());
        self.lanes.write().push(Arc::clone(&lane));

        ProducerToken { lane }
    }

    /// Claims room for one event. Every successful reservation must be followed by exactly one
    /// [`push()`][Self::push].
    pub(crate) fn reserve(&self) -> Result<()> {
        let Some(capacity) = self.capacity else {
            // Relaxed is enough for a counter that only gates admission.
            self.len.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |len| {
                (len < capacity.get()).then(|| len.wrapping_add(1))
            })
            .map(|_| ())
            .map_err(|_| Error::QueueFull {
                capacity: capacity.get(),
            })
    }

    #[inline]
    pub(crate) fn push(&self, token: &ProducerToken, event: SequencedEvent) {
        token.lane.push(event);
    }

    /// Removes up to `max` events, visiting lanes in creation order.
    ///
    /// Returns fewer than `max` events if not all pushes are visible yet. Whatever is left stays
    /// queued for the next call. Dequeued events keep their room in the queue until
    /// [`release()`][Self::release] gives it back.
    pub(crate) fn try_dequeue_bulk(&self, max: usize) -> Vec<SequencedEvent> {
        let mut events = Vec::with_capacity(max.min(self.len()));

        {
            let lanes = self.lanes.read();

            'lanes: for lane in lanes.iter() {
                while events.len() < max {
                    match lane.pop() {
                        Some(event) => events.push(event),
                        None => continue 'lanes,
                    }
                }

                break;
            }
        }

        events
    }

    /// Gives back the room of `count` dequeued events.
    pub(crate) fn release(&self, count: usize) {
        self.len.fetch_sub(count, Ordering::AcqRel);
    }

    /// Events reserved but not yet released.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}
