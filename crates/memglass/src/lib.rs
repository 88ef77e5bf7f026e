//! Cross-process live-state observation over shared memory.
//!
//! A **producer** process publishes a typed, labelled set of trivially
//! copyable records into a shared-memory arena; any number of **observer**
//! processes attach to the same arena and read (or occasionally write)
//! individual fields by name, with per-field synchronization selected by the
//! producer's schema. Observers never stop, signal or instrument the
//! producer — all coordination is memory ordering on shared atomics.
//!
//! # Producer side
//!
//! ```ignore
//! use memglass::{Config, Producer, Schema, TypeDescriptor, FieldDescriptor};
//! use memglass::{Atomicity, PrimitiveType};
//!
//! let mut schema = Schema::new();
//! schema.register(
//!     TypeDescriptor::new("Counter", 16, 8)
//!         .field(FieldDescriptor::primitive(
//!             "value", 0, 8, PrimitiveType::UInt64, Atomicity::Atomic,
//!         ))
//!         .field(FieldDescriptor::primitive(
//!             "timestamp", 8, 8, PrimitiveType::UInt64, Atomicity::None,
//!         )),
//! );
//!
//! let producer = Producer::init("metrics", Config::default(), schema)?;
//! let counter = producer.create::<Counter>("main").unwrap();
//! counter.value.store(42, std::sync::atomic::Ordering::Release);
//! ```
//!
//! # Observer side
//!
//! ```ignore
//! use memglass::Observer;
//!
//! let mut observer = Observer::connect("metrics")?;
//! let view = observer.find("main").unwrap();
//! let value: u64 = view.field("value").get();
//! ```

pub mod alloc;
pub mod directory;
pub mod error;
pub mod layout;
pub mod observer;
pub mod producer;
pub mod schema;
pub mod sync;

pub use error::Error;
pub use layout::{Atomicity, FieldEntry, ObjectState, PrimitiveType, USER_TYPE_BASE, field_flags};
pub use observer::{FieldProxy, ObjectView, ObservedObject, ObservedType, Observer};
pub use producer::{Config, Producer, Shared, SharedArray};
pub use schema::{FieldDescriptor, Observed, Schema, TypeDescriptor};
pub use sync::{Seqlock, SpinLock};

// Process-wide session entry points.
pub use producer::{create, create_array, create_with, destroy, init, shutdown};
