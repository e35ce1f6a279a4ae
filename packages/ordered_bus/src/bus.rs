use std::any::type_name;
use std::fmt;
use std::num::NonZero;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use nm::Event;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::metrics::{BATCH_SIZE, EVENTS_REJECTED, EVENTS_SUBMITTED};
use crate::{
    BatchSorter, Error, EventBusBuilder, EventEnvelope, EventProcessor, EventRegistry,
    EventTypeId, HandlerEntry, HandlerKey, IntakeQueue, ProcessorId, Result, SequencedEvent,
    SharedBatch,
};

/// Carries events from any number of producer threads to any number of processors, in the
/// order the events were submitted.
///
/// Submitting an event only enqueues it. Events reach processors in two steps:
///
/// 1. [`move_to_processors()`][Self::move_to_processors] takes everything submitted so far,
///    restores submission order and delivers the result as one batch to every processor.
/// 2. Each processor calls [`process_events()`][Self::process_events] on its own schedule to
///    invoke its handlers for the delivered events.
///
/// Every processor sees every event exactly once and in the same order. Each event is dropped
/// once all processors have dispatched it.
///
/// # Thread safety
///
/// The bus is `Send + Sync` and is typically shared in an `Arc`. Any thread may submit events
/// or move them to processors. A single processor, however, must not be used by two threads at
/// once: overlapping `subscribe()`, `unsubscribe()` or `process_events()` calls for the same
/// processor panic. This includes calling them for a processor from inside one of its own
/// handlers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU64, Ordering};
///
/// use ordered_bus::{EventBus, EventRegistry};
///
/// struct Deposit(u64);
///
/// #[derive(Default)]
/// struct Account {
///     balance: AtomicU64,
/// }
///
/// impl Account {
///     fn on_deposit(&self, deposit: &Deposit) {
///         self.balance.fetch_add(deposit.0, Ordering::Relaxed);
///     }
/// }
///
/// let registry = EventRegistry::builder().register::<Deposit>().build();
/// let bus = EventBus::new(registry)?;
///
/// let processor = bus.get_processor();
/// let account = Arc::new(Account::default());
/// bus.subscribe(processor, &account, Account::on_deposit)?;
///
/// bus.submit(processor, Deposit(10))?;
/// bus.submit(processor, Deposit(5))?;
///
/// assert_eq!(bus.move_to_processors(), 2);
/// assert_eq!(bus.process_events(processor)?, 2);
/// assert_eq!(account.balance.load(Ordering::Relaxed), 15);
/// # Ok::<(), ordered_bus::Error>(())
/// ```
pub struct EventBus {
    registry: EventRegistry,

    /// Append-only. A processor's position is its `ProcessorId`.
    processors: RwLock<Vec<Arc<EventProcessor>>>,

    intake: IntakeQueue,

    /// The sequence number the next submitted event gets.
    event_count: AtomicU64,

    /// Events already delivered to processors, which is also the sequence number of the next
    /// event to deliver. Only written while holding `pipeline`.
    subtracted: AtomicU64,

    /// Serializes `move_to_processors()` calls.
    pipeline: Mutex<Pipeline>,
}

#[derive(Debug)]
struct Pipeline {
    sorter: BatchSorter,

    /// Dequeued events that wait for an earlier sequence number to show up, in sequence order.
    held: Vec<SequencedEvent>,
}

impl EventBus {
    /// Creates a bus with default settings for the event types in `registry`.
    ///
    /// Use [`EventBus::builder()`] for custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoProcessorsAvailable`] if no processor could be obtained for the
    /// sort workers.
    pub fn new(registry: EventRegistry) -> Result<Self> {
        Self::builder(registry).build()
    }

    /// Creates a builder for configuring a bus for the event types in `registry`.
    pub fn builder(registry: EventRegistry) -> EventBusBuilder {
        EventBusBuilder::new(registry)
    }

    pub(crate) fn new_inner(
        registry: EventRegistry,
        sorter: BatchSorter,
        intake_capacity: Option<NonZero<usize>>,
    ) -> Self {
        Self {
            registry,
            processors: RwLock::new(Vec::new()),
            intake: IntakeQueue::new(intake_capacity),
            event_count: AtomicU64::new(0),
            subtracted: AtomicU64::new(0),
            pipeline: Mutex::new(Pipeline {
                sorter,
                held: Vec::new(),
            }),
        }
    }

    /// Creates a new processor and returns its identity.
    ///
    /// The processor receives every batch moved after this call, including events that were
    /// submitted before it existed but not yet moved.
    pub fn get_processor(&self) -> ProcessorId {
        let mut processors = self.processors.write();

        let id = ProcessorId::new(processors.len());
        processors.push(Arc::new(EventProcessor::new(
            id,
            self.registry.len(),
            self.intake.producer_token(),
        )));

        debug!(processor = %id, "processor created");

        id
    }

    /// Subscribes `method` on `handler` to events of type `E` on the given processor.
    ///
    /// Handlers for the same event type run in the order they were subscribed. A handler may be
    /// subscribed more than once, in which case it is invoked once per subscription.
    ///
    /// The bus does not keep `handler` alive. If the handler is dropped while still subscribed,
    /// it is no longer invoked and its subscriptions are removed during the next dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProcessor`] if the processor does not exist and
    /// [`Error::UnregisteredEventType`] if `E` is not in the registry.
    ///
    /// # Panics
    ///
    /// Panics if the processor is in use by another call at the same time.
    pub fn subscribe<H, E, M>(
        &self,
        processor: ProcessorId,
        handler: &Arc<H>,
        method: M,
    ) -> Result<()>
    where
        H: Send + Sync + 'static,
        E: 'static,
        M: Fn(&H, &E) + Send + 'static,
    {
        self.with_processor(processor, |target| {
            let event_type = self.event_type_of::<E>()?;
            target.subscribe(event_type, HandlerEntry::new(handler, method));

            trace!(
                processor = %processor,
                event_type = type_name::<E>(),
                handler = type_name::<H>(),
                "handler subscribed"
            );

            Ok(())
        })?
    }

    /// Removes every subscription of `handler` on the given processor, for all event types.
    ///
    /// Returns the number of subscriptions removed, which is zero if the handler was not
    /// subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProcessor`] if the processor does not exist.
    ///
    /// # Panics
    ///
    /// Panics if the processor is in use by another call at the same time.
    pub fn unsubscribe<H>(&self, processor: ProcessorId, handler: &Arc<H>) -> Result<usize> {
        self.with_processor(processor, |target| target.unsubscribe(HandlerKey::of(handler)))
    }

    /// Submits an event, stamping it with the next global sequence number.
    ///
    /// The event enters the intake queue through the producer lane of the given processor. Any
    /// thread may submit through any processor. The event is delivered to all processors, not
    /// only the one it was submitted through.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProcessor`] if the processor does not exist,
    /// [`Error::UnregisteredEventType`] if `E` is not in the registry and
    /// [`Error::QueueFull`] if an intake capacity is configured and reached. A rejected event
    /// is dropped and does not consume a sequence number.
    pub fn submit<E>(&self, processor: ProcessorId, event: E) -> Result<()>
    where
        E: Send + Sync + 'static,
    {
        let result = self.with_processor(processor, |target| {
            let event_type = self.event_type_of::<E>()?;
            self.intake.reserve()?;

            // Relaxed is enough: the counter only hands out unique numbers, and the intake
            // queue synchronizes the events themselves.
            let sequence = self.event_count.fetch_add(1, Ordering::Relaxed);

            self.intake.push(
                target.producer(),
                SequencedEvent {
                    envelope: EventEnvelope::new(event_type, event),
                    sequence,
                },
            );

            trace!(processor = %processor, sequence, "event submitted");

            Ok(())
        });

        match result {
            Ok(Ok(())) => {
                EVENTS_SUBMITTED.with(Event::observe_once);
                Ok(())
            }
            Ok(Err(e)) | Err(e) => {
                EVENTS_REJECTED.with(Event::observe_once);
                Err(e)
            }
        }
    }

    /// Dispatches every event delivered to the processor so far to its handlers, on the
    /// calling thread, and returns how many events were dispatched.
    ///
    /// Handlers may submit events and create processors. They must not use their own processor.
    ///
    /// If a handler panics, the panic propagates to the caller. The event being handled counts
    /// as dispatched, so the next call continues with the event after it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProcessor`] if the processor does not exist.
    ///
    /// # Panics
    ///
    /// Panics if the processor is in use by another call at the same time.
    pub fn process_events(&self, processor: ProcessorId) -> Result<usize> {
        // The list lock is not held while handlers run.
        let target = self.with_processor(processor, Arc::clone)?;

        Ok(target.process_events())
    }

    /// Takes the events submitted so far out of the intake queue, restores their submission
    /// order and delivers them as one batch to every processor.
    ///
    /// Returns the number of events moved, which is zero if nothing was submitted since the
    /// last call. Only an unbroken run of sequence numbers is moved: if an event has its
    /// sequence number but its submission has not finished yet, it and every later event are
    /// left for a following call. If there are no processors, the moved events are dropped.
    ///
    /// Calls are serialized: a second concurrent call waits for the first to finish.
    pub fn move_to_processors(&self) -> usize {
        let mut pipeline = self.pipeline.lock();
        let Pipeline { sorter, held } = &mut *pipeline;

        let next_sequence = self.subtracted.load(Ordering::Relaxed);
        let target = self
            .event_count
            .load(Ordering::Relaxed)
            .saturating_sub(next_sequence);

        if target == 0 {
            return 0;
        }

        let mut events = self.intake.try_dequeue_bulk(usize::MAX);

        if events.is_empty() && held.is_empty() {
            trace!(target, "submitted events not yet visible in the intake queue");
            return 0;
        }

        events.append(held);
        let mut ordered = sorter.order(events);

        let actual = ordered
            .iter()
            .zip(next_sequence..)
            .take_while(|(event, expected)| event.sequence == *expected)
            .count();

        *held = ordered.split_off(actual);

        if actual == 0 {
            trace!(
                next_sequence,
                held = held.len(),
                "waiting for an earlier submission to finish"
            );
            return 0;
        }

        let batch = SharedBatch::new(ordered.into_iter().map(|event| event.envelope).collect());

        let processor_count = {
            let processors = self.processors.read();

            for processor in processors.iter() {
                processor.add_events(batch.clone());
            }

            processors.len()
        };

        drop(batch);

        self.intake.release(actual);
        self.subtracted
            .store(next_sequence.wrapping_add(actual as u64), Ordering::Relaxed);

        BATCH_SIZE.with(|e| e.observe(actual));
        debug!(
            events = actual,
            shortfall = target.saturating_sub(actual as u64),
            held = held.len(),
            processors = processor_count,
            "batch distributed"
        );

        actual
    }

    /// Number of processors created so far.
    #[must_use]
    pub fn processor_count(&self) -> usize {
        self.processors.read().len()
    }

    /// The event types this bus carries.
    #[must_use]
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Events submitted but not yet moved to processors.
    ///
    /// This is a snapshot that may already be stale when it is returned.
    #[must_use]
    pub fn pending_events(&self) -> u64 {
        self.event_count
            .load(Ordering::Relaxed)
            .saturating_sub(self.subtracted.load(Ordering::Relaxed))
    }

    /// Events accepted by [`submit()`][Self::submit] over the lifetime of the bus.
    #[must_use]
    pub fn submitted_events(&self) -> u64 {
        self.event_count.load(Ordering::Relaxed)
    }

    fn with_processor<R>(
        &self,
        processor: ProcessorId,
        f: impl FnOnce(&Arc<EventProcessor>) -> R,
    ) -> Result<R> {
        let processors = self.processors.read();

        let target = processors
            .get(processor.index())
            .ok_or(Error::UnknownProcessor {
                processor,
                processor_count: processors.len(),
            })?;

        Ok(f(target))
    }

    fn event_type_of<E: 'static>(&self) -> Result<EventTypeId> {
        self.registry
            .id_of::<E>()
            .ok_or(Error::UnregisteredEventType {
                type_name: type_name::<E>(),
            })
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("registry", &self.registry)
            .field("processor_count", &self.processor_count())
            .field("submitted_events", &self.submitted_events())
            .field("pending_events", &self.pending_events())
            .finish_non_exhaustive()
    }
}
