//! Stable segment naming shared by producers and observers.
//!
//! Both sides derive the same file names from `(session, segment)`:
//!
//! - header: `memglass_<session>_header`
//! - data region: `memglass_<session>_region_<dddd>` (4-digit, zero-padded)
//!
//! With the default base directory of `/dev/shm` these are the POSIX
//! shared-memory objects `/memglass_<session>_header` and so on. Tests point
//! the base directory at a tempdir instead.

use std::path::{Path, PathBuf};

/// Default base directory for session segments.
pub const DEFAULT_SHM_DIR: &str = "/dev/shm";

/// Maximum session-name length in bytes (the header stores it NUL-terminated
/// in a 64-byte field).
pub const MAX_SESSION_NAME: usize = 63;

/// Path of the header segment for `session`.
pub fn header_path(dir: &Path, session: &str) -> PathBuf {
    dir.join(format!("memglass_{session}_header"))
}

/// Path of data region `region_id` for `session`.
pub fn region_path(dir: &Path, session: &str, region_id: u64) -> PathBuf {
    dir.join(format!("memglass_{session}_region_{region_id:04}"))
}

/// Check that `session` fits the header field and contains no path
/// separators.
pub fn valid_session_name(session: &str) -> bool {
    !session.is_empty()
        && session.len() <= MAX_SESSION_NAME
        && !session.contains('/')
        && !session.contains('\0')
}
