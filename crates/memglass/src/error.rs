//! Error type shared by the producer and observer paths.
//!
//! Capacity failures on the hot allocation path (`create*`) surface as
//! `None` rather than `Err`; the reasons are logged. A torn seqlock try-read
//! is not an error at all — it comes back as `None` from
//! `FieldProxy::try_get`, and an unknown field name comes back as an invalid
//! proxy.

use std::io;

#[derive(Debug)]
pub enum Error {
    /// Producer `init` called while a session already exists in this process.
    AlreadyInitialized,
    /// Session name is empty, too long, or contains path separators.
    InvalidSessionName,
    /// The OS refused to create, attach or resize a named segment.
    MappingFailed(io::Error),
    /// No header segment exists for the session.
    HeaderNotFound,
    /// The header segment is not a memglass header.
    BadMagic,
    /// The producer speaks a different protocol version.
    VersionMismatch { expected: u32, actual: u32 },
    /// The type table is at capacity.
    TypeTableFull,
    /// The field-entry pool is at capacity.
    FieldPoolFull,
    /// The object directory is at capacity.
    DirectoryFull,
    /// A new data region could not be created.
    AllocatorExhausted,
    /// `create<T>` for a type the schema does not name.
    TypeNotRegistered,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AlreadyInitialized => write!(f, "a memglass session is already initialized"),
            Error::InvalidSessionName => write!(f, "invalid session name"),
            Error::MappingFailed(e) => write!(f, "shared memory mapping failed: {e}"),
            Error::HeaderNotFound => write!(f, "session header segment not found"),
            Error::BadMagic => write!(f, "segment is not a memglass header"),
            Error::VersionMismatch { expected, actual } => {
                write!(f, "protocol version mismatch: expected {expected}, got {actual}")
            }
            Error::TypeTableFull => write!(f, "type table is full"),
            Error::FieldPoolFull => write!(f, "field-entry pool is full"),
            Error::DirectoryFull => write!(f, "object directory is full"),
            Error::AllocatorExhausted => write!(f, "region allocator exhausted"),
            Error::TypeNotRegistered => write!(f, "type is not present in the session schema"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MappingFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::MappingFailed(e)
    }
}
