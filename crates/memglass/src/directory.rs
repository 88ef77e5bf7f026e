//! Producer-side object directory management.
//!
//! Slots are append-only: registration claims the next slot, fills it, and
//! publishes it by advancing `object_count` and the sequence (release).
//! Destruction flips the slot's state word; the payload bytes stay valid for
//! the rest of the session but the object is no longer advertised.

use std::collections::HashMap;

use memglass_shm::Region;
use tracing::debug;

use crate::error::Error;
use crate::layout::{ObjectState, SessionHeader, object_entry, object_entry_mut, put_name};

use core::sync::atomic::Ordering;

/// Tracks which directory slot each live pointer was registered under.
#[derive(Default)]
pub struct ObjectDirectory {
    by_ptr: HashMap<usize, u32>,
}

impl ObjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next slot for `ptr` and publish it as `Alive`.
    pub fn register(
        &mut self,
        header_region: Region,
        header: &SessionHeader,
        ptr: *mut u8,
        type_id: u32,
        location: (u64, u64),
        label: &str,
    ) -> Result<u32, Error> {
        let index = header.object_count.load(Ordering::Acquire);
        if index >= header.object_dir_capacity {
            return Err(Error::DirectoryFull);
        }

        let (region_id, offset) = location;
        let entry = unsafe { object_entry_mut(header_region, header, index) };
        entry.type_id = type_id;
        entry.region_id = region_id;
        entry.offset = offset;
        entry.generation = 1;
        put_name(&mut entry.label, label);
        entry
            .state
            .store(ObjectState::Alive as u32, Ordering::Release);

        header.object_count.store(index + 1, Ordering::Release);
        header.bump_sequence();

        self.by_ptr.insert(ptr as usize, index);
        debug!(label, type_id, region_id, offset, "registered object");
        Ok(index)
    }

    /// Mark the object at `ptr` destroyed. Returns `false` for unknown
    /// pointers.
    pub fn destroy(
        &mut self,
        header_region: Region,
        header: &SessionHeader,
        ptr: *const u8,
    ) -> bool {
        let Some(index) = self.by_ptr.remove(&(ptr as usize)) else {
            return false;
        };

        let entry = unsafe { object_entry(header_region, header, index) };
        entry
            .state
            .store(ObjectState::Destroyed as u32, Ordering::Release);
        header.bump_sequence();
        debug!(label = entry.label(), "destroyed object");
        true
    }

    /// Slot index of the first `Alive` entry labelled `label`.
    pub fn find(
        &self,
        header_region: Region,
        header: &SessionHeader,
        label: &str,
    ) -> Option<u32> {
        let count = header.object_count.load(Ordering::Acquire);
        (0..count).find(|&i| {
            let entry = unsafe { object_entry(header_region, header, i) };
            entry.state() == ObjectState::Alive && entry.label() == label
        })
    }

    /// Number of `Alive` entries.
    pub fn alive_count(&self, header_region: Region, header: &SessionHeader) -> usize {
        let count = header.object_count.load(Ordering::Acquire);
        (0..count)
            .filter(|&i| {
                let entry = unsafe { object_entry(header_region, header, i) };
                entry.state() == ObjectState::Alive
            })
            .count()
    }
}
