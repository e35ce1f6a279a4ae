use thiserror::Error;

use crate::ProcessorId;

/// Errors surfaced by [`EventBus`][crate::EventBus] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller referred to a processor that was never created on this bus.
    #[error("{processor} does not exist: the bus has {processor_count} processors")]
    UnknownProcessor {
        /// The processor the caller asked for.
        processor: ProcessorId,

        /// How many processors the bus had when the call was made.
        processor_count: usize,
    },

    /// The event type was not part of the registry the bus was built with.
    #[error("event type '{type_name}' is not registered with this bus")]
    UnregisteredEventType {
        /// The Rust type name of the offending event type.
        type_name: &'static str,
    },

    /// The intake queue already holds as many events as the configured capacity allows.
    #[error("intake queue is full: it already holds {capacity} events")]
    QueueFull {
        /// The configured intake capacity.
        capacity: usize,
    },

    /// No processor could be obtained to run the sort workers on.
    #[error("no processors are available for the sort workers")]
    NoProcessorsAvailable,
}

/// A specialized `Result` type for bus operations, returning the crate's [`Error`] type as the
/// error value.
pub type Result<T> = std::result::Result<T, Error>;
