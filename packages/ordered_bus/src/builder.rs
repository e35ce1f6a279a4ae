use std::num::NonZero;

use many_cpus::{ProcessorSet, ProcessorSetBuilder};
use tracing::debug;

use crate::radix::{MAX_BUCKET_BITS, MIN_RADIX};
use crate::{BatchSorter, Error, EventBus, EventRegistry, Result};

const DEFAULT_BUCKET_BITS: u32 = 4;
const DEFAULT_RADIX: usize = 32;
const DEFAULT_PARALLEL_SORT_THRESHOLD: usize = 4096;

/// Builder for configuring an [`EventBus`].
///
/// Obtained from [`EventBus::builder()`].
///
/// # Example
///
/// ```
/// use std::num::NonZero;
///
/// use ordered_bus::{EventBus, EventRegistry};
///
/// struct Tick;
///
/// let registry = EventRegistry::builder().register::<Tick>().build();
///
/// let bus = EventBus::builder(registry)
///     .bucket_bits(2)
///     .radix(10)
///     .intake_capacity(NonZero::new(1000).unwrap())
///     .build()?;
///
/// let processor = bus.get_processor();
/// bus.submit(processor, Tick)?;
/// # Ok::<(), ordered_bus::Error>(())
/// ```
#[derive(Debug)]
#[must_use]
pub struct EventBusBuilder {
    registry: EventRegistry,
    bucket_bits: u32,
    radix: usize,
    parallel_sort_threshold: usize,
    sort_processors: Option<ProcessorSet>,
    intake_capacity: Option<NonZero<usize>>,
}

impl EventBusBuilder {
    pub(crate) fn new(registry: EventRegistry) -> Self {
        Self {
            registry,
            bucket_bits: DEFAULT_BUCKET_BITS,
            radix: DEFAULT_RADIX,
            parallel_sort_threshold: DEFAULT_PARALLEL_SORT_THRESHOLD,
            sort_processors: None,
            intake_capacity: None,
        }
    }

    /// Sets how many buckets each batch is split into before sorting, as a power of two.
    ///
    /// Buckets are sorted independently, so more buckets allow more parallelism. Values outside
    /// `1..=8` are clamped into that range.
    ///
    /// Default is 4 (16 buckets).
    pub fn bucket_bits(mut self, bits: u32) -> Self {
        self.bucket_bits = bits.clamp(1, MAX_BUCKET_BITS);
        self
    }

    /// Sets the radix of the per-bucket sort. A larger radix means fewer passes over the data
    /// but a larger table of digit counts.
    ///
    /// Default is 32.
    ///
    /// # Panics
    ///
    /// Panics if `radix` is below 2.
    pub fn radix(mut self, radix: usize) -> Self {
        assert!(
            radix >= MIN_RADIX,
            "radix must be at least {MIN_RADIX}, got {radix}"
        );

        self.radix = radix;
        self
    }

    /// Sets the smallest batch for which buckets are sorted on the sort workers. Smaller
    /// batches are sorted on the thread that calls
    /// [`move_to_processors()`][EventBus::move_to_processors].
    ///
    /// Default is 4096.
    pub fn parallel_sort_threshold(mut self, events: usize) -> Self {
        self.parallel_sort_threshold = events;
        self
    }

    /// Sets the processors that sort workers run on. One worker is started per processor, up to
    /// the number of buckets.
    ///
    /// Default is all processors available to the current process.
    pub fn sort_processors(mut self, processors: ProcessorSet) -> Self {
        self.sort_processors = Some(processors);
        self
    }

    /// Limits how many events may wait in the intake queue at once. When the limit is reached,
    /// [`EventBus::submit()`] fails with [`Error::QueueFull`] until
    /// [`move_to_processors()`][EventBus::move_to_processors] makes room.
    ///
    /// Default is no limit.
    pub fn intake_capacity(mut self, events: NonZero<usize>) -> Self {
        self.intake_capacity = Some(events);
        self
    }

    /// Builds the bus with the configured settings.
    ///
    /// Sort worker threads are not started here but the first time a batch is large enough to
    /// need them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoProcessorsAvailable`] if no processor set was provided and none could
    /// be obtained from the operating system.
    pub fn build(self) -> Result<EventBus> {
        let bucket_count =
            NonZero::new(1_usize << self.bucket_bits).expect("a power of two is never zero");

        let available = match self.sort_processors {
            Some(processors) => processors,
            None => ProcessorSetBuilder::new()
                .take_all()
                .ok_or(Error::NoProcessorsAvailable)?,
        };

        let sort_processors = available
            .to_builder()
            .take(bucket_count)
            .unwrap_or(available);

        debug!(
            event_types = self.registry.len(),
            buckets = bucket_count.get(),
            radix = self.radix,
            sort_workers = sort_processors.len(),
            intake_capacity = self.intake_capacity.map(NonZero::get),
            "event bus created"
        );

        let sorter = BatchSorter::new(
            self.bucket_bits,
            self.radix,
            self.parallel_sort_threshold,
            sort_processors,
        );

        Ok(EventBus::new_inner(
            self.registry,
            sorter,
            self.intake_capacity,
        ))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;

    use super::*;

    struct Tick;

    fn registry() -> EventRegistry {
        EventRegistry::builder().register::<Tick>().build()
    }

    #[test]
    fn defaults() {
        let builder = EventBusBuilder::new(registry());

        assert_eq!(builder.bucket_bits, DEFAULT_BUCKET_BITS);
        assert_eq!(builder.radix, DEFAULT_RADIX);
        assert_eq!(builder.parallel_sort_threshold, DEFAULT_PARALLEL_SORT_THRESHOLD);
        assert!(builder.sort_processors.is_none());
        assert!(builder.intake_capacity.is_none());
    }

    #[test]
    fn bucket_bits_are_clamped() {
        assert_eq!(EventBusBuilder::new(registry()).bucket_bits(0).bucket_bits, 1);
        assert_eq!(
            EventBusBuilder::new(registry()).bucket_bits(40).bucket_bits,
            MAX_BUCKET_BITS
        );
        assert_eq!(EventBusBuilder::new(registry()).bucket_bits(6).bucket_bits, 6);
    }

    #[test]
    #[should_panic]
    fn radix_of_one_panics() {
        let _builder = EventBusBuilder::new(registry()).radix(1);
    }

    #[cfg_attr(miri, ignore)] // ProcessorSet is not supported under Miri.
    #[test]
    fn builds_with_explicit_processors() {
        let bus = EventBusBuilder::new(registry())
            .sort_processors(ProcessorSetBuilder::new().take(nz!(1)).unwrap())
            .intake_capacity(nz!(3))
            .build()
            .unwrap();

        let processor = bus.get_processor();
        for _ in 0..3 {
            bus.submit(processor, Tick).unwrap();
        }

        assert!(matches!(
            bus.submit(processor, Tick),
            Err(Error::QueueFull { capacity: 3 })
        ));

        // Moving the events to processors makes room again.
        assert_eq!(bus.move_to_processors(), 3);
        bus.submit(processor, Tick).unwrap();
    }

    #[cfg_attr(miri, ignore)] // ProcessorSet is not supported under Miri.
    #[test]
    fn sort_workers_are_capped_at_bucket_count() {
        // Two buckets need at most two workers, whatever the machine offers.
        let bus = EventBusBuilder::new(registry())
            .bucket_bits(1)
            .sort_processors(ProcessorSetBuilder::new().take_all().unwrap())
            .parallel_sort_threshold(0)
            .build()
            .unwrap();

        let processor = bus.get_processor();
        for _ in 0..10 {
            bus.submit(processor, Tick).unwrap();
        }

        assert_eq!(bus.move_to_processors(), 10);
        assert_eq!(bus.process_events(processor).unwrap(), 10);
    }
}
