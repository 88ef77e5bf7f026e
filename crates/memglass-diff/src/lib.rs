//! Snapshot differencing for memglass sessions.
//!
//! A stateful loop over an [`memglass::Observer`]: take a snapshot of every
//! live object's primitive fields, diff it against the previous snapshot,
//! and emit the result as text, line-JSON, pretty JSON, or the compact
//! `.mgd` binary stream (which can be decoded back to text).
//!
//! The `memglass-diff` binary wraps this into a CLI; the library surface is
//! used directly by tests and by anything embedding the differ.

pub mod codec;
pub mod diff;
pub mod render;
pub mod snapshot;
pub mod value;
pub mod wire;

pub use codec::{DecodeError, DiffReader, DiffWriter};
pub use diff::{FieldChange, SnapshotDiff, diff_snapshots};
pub use snapshot::{ObjectSnapshot, Snapshot, take_snapshot};
pub use value::Value;
