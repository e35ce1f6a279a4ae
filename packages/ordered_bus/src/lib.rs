#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! In-process publish/subscribe event bus that delivers events from many producer threads to
//! per-thread processors in global submission order.
//!
//! Producers on any thread [submit][EventBus::submit] typed events. Periodically, one thread
//! [moves][EventBus::move_to_processors] everything submitted so far to the processors: the
//! events are taken out of the intake queue, put back into submission order with a bucketed
//! radix sort and delivered as one shared batch to every processor. Each processor then
//! [dispatches][EventBus::process_events] the batch to its subscribed handlers on whatever
//! thread owns it.
//!
//! # Quick start
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use ordered_bus::{EventBus, EventRegistry};
//!
//! struct Hello(&'static str);
//! struct Goodbye;
//!
//! #[derive(Default)]
//! struct Transcript {
//!     lines: Mutex<Vec<String>>,
//! }
//!
//! impl Transcript {
//!     fn on_hello(&self, hello: &Hello) {
//!         self.lines.lock().unwrap().push(format!("hello {}", hello.0));
//!     }
//!
//!     fn on_goodbye(&self, _: &Goodbye) {
//!         self.lines.lock().unwrap().push("goodbye".to_string());
//!     }
//! }
//!
//! // Every event type is registered before the bus is created.
//! let registry = EventRegistry::builder()
//!     .register::<Hello>()
//!     .register::<Goodbye>()
//!     .build();
//!
//! let bus = EventBus::new(registry)?;
//! let processor = bus.get_processor();
//!
//! let transcript = Arc::new(Transcript::default());
//! bus.subscribe(processor, &transcript, Transcript::on_hello)?;
//! bus.subscribe(processor, &transcript, Transcript::on_goodbye)?;
//!
//! bus.submit(processor, Hello("world"))?;
//! bus.submit(processor, Goodbye)?;
//!
//! bus.move_to_processors();
//! bus.process_events(processor)?;
//!
//! assert_eq!(
//!     *transcript.lines.lock().unwrap(),
//!     vec!["hello world".to_string(), "goodbye".to_string()]
//! );
//! # Ok::<(), ordered_bus::Error>(())
//! ```
//!
//! # Ordering
//!
//! Every event is stamped with a global sequence number when it is submitted. Processors see
//! events in sequence number order, across all producer threads and across batches.
//!
//! A batch only ever holds an unbroken run of sequence numbers that continues where the previous
//! batch ended. If a submission has its sequence number but has not reached the intake queue
//! when events are moved, that event and every later one are held back, even those already
//! queued. They are moved together by the first call after the submission finishes.
//!
//! # Memory
//!
//! A batch is shared by all processors. Its events are dropped once every processor has
//! dispatched it. Handlers are not owned by the bus: a handler that is dropped while still
//! subscribed is simply no longer invoked.
//!
//! # Metrics
//!
//! The bus reports `nm` events prefixed with `ordered_bus_`: events submitted, rejected and
//! dispatched, batch sizes, sort durations and handlers pruned after being dropped.

mod batch;
mod builder;
mod bus;
mod envelope;
mod error;
mod handler;
mod intake;
mod metrics;
mod processor;
mod radix;
mod registry;
mod sort_pool;
mod sorter;

pub(crate) use batch::*;
pub use builder::*;
pub use bus::*;
pub(crate) use envelope::*;
pub use error::*;
pub(crate) use handler::*;
pub(crate) use intake::*;
pub(crate) use processor::EventProcessor;
pub use processor::ProcessorId;
pub use radix::{MAX_BUCKET_BITS, MIN_RADIX, bucketed_sort, radix_sort};
pub use registry::*;
pub(crate) use sort_pool::*;
pub(crate) use sorter::*;
