//! Shared-memory plumbing for memglass sessions.
//!
//! A memglass session is a set of named, file-backed `MAP_SHARED` mappings:
//! one header segment plus a chain of data regions. This crate owns the OS
//! side of that picture — creating, attaching to, growing and unlinking the
//! mappings, and the typed byte windows over them — and the naming scheme
//! that lets unrelated processes find the same segments.
//!
//! Everything above this layer (directory layout, synchronization, typed
//! field access) lives in the `memglass` crate.

mod mmap;

pub mod names;

pub use mmap::{MmapSegment, Region};
