//! Bump allocation over a growable chain of data regions.
//!
//! Each region is a named shared-memory segment with a [`RegionDescriptor`]
//! at offset 0 and a monotonic bump pointer. When the current region cannot
//! satisfy an allocation, a new region is created with double the payload
//! size (capped), chained in through the previous descriptor's
//! `next_region_id`, and announced with a sequence bump so observers re-walk
//! the chain.

use std::path::{Path, PathBuf};

use memglass_shm::{MmapSegment, Region, names};
use tracing::{debug, warn};

use crate::error::Error;
use crate::layout::{
    REGION_DESCRIPTOR_SIZE, REGION_MAGIC, RegionDescriptor, SessionHeader, align_up, put_name,
};

use core::sync::atomic::Ordering;

/// A successful allocation: where the bytes live and how to reach them.
pub struct Allocation {
    pub region_id: u64,
    /// Byte offset from the region base (descriptor included).
    pub offset: u64,
    pub ptr: *mut u8,
}

struct DataRegion {
    id: u64,
    shm: MmapSegment,
}

impl DataRegion {
    #[inline]
    fn descriptor(&self) -> &RegionDescriptor {
        unsafe { self.shm.region().get::<RegionDescriptor>(0) }
    }
}

/// Producer-side owner of the region chain.
///
/// The producer serializes access behind its own mutex; nothing here is
/// thread-safe on its own.
pub struct RegionManager {
    session: String,
    dir: PathBuf,
    regions: Vec<DataRegion>,
    next_region_id: u64,
    /// Payload size of the most recently created region; doubles on growth.
    current_region_size: usize,
    max_region_size: usize,
}

impl RegionManager {
    /// Create region 1 and publish it as the chain head.
    pub fn init(
        session: &str,
        dir: &Path,
        initial_size: usize,
        max_region_size: usize,
        header: &SessionHeader,
    ) -> Result<Self, Error> {
        let mut manager = Self {
            session: session.to_string(),
            dir: dir.to_path_buf(),
            regions: Vec::new(),
            next_region_id: 1,
            current_region_size: initial_size,
            max_region_size,
        };

        manager.create_region(initial_size)?;
        header
            .first_region_id
            .store(manager.regions[0].id, Ordering::Release);
        Ok(manager)
    }

    /// Map a fresh region of `payload` bytes and link it into the chain.
    fn create_region(&mut self, payload: usize) -> Result<(), Error> {
        let id = self.next_region_id;
        let path = names::region_path(&self.dir, &self.session, id);
        let total = REGION_DESCRIPTOR_SIZE + payload;

        let shm = MmapSegment::create(&path, total)?;
        let region = shm.region();

        let desc = unsafe { region.get_mut::<RegionDescriptor>(0) };
        desc.magic = REGION_MAGIC;
        desc.region_id = id;
        desc.size = total as u64;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        put_name(&mut desc.shm_name, &name);
        desc.used.store(REGION_DESCRIPTOR_SIZE as u64, Ordering::Release);
        desc.next_region_id.store(0, Ordering::Release);

        // The new region is fully initialized; only now make it reachable.
        if let Some(prev) = self.regions.last() {
            prev.descriptor()
                .next_region_id
                .store(id, Ordering::Release);
        }

        debug!(region_id = id, total, "created data region");

        self.next_region_id += 1;
        self.regions.push(DataRegion { id, shm });
        Ok(())
    }

    /// Allocate `size` bytes aligned to `align`.
    ///
    /// Returns `None` when a needed new region cannot be created (mapping
    /// failure or the size cap cannot fit the request).
    pub fn allocate(
        &mut self,
        size: usize,
        align: usize,
        header: &SessionHeader,
    ) -> Option<Allocation> {
        debug_assert!(align.is_power_of_two());

        let current = self.regions.last()?;
        let desc = current.descriptor();
        let mut used = desc.used.load(Ordering::Acquire) as usize;
        let mut aligned = align_up(used, align);

        if aligned + size > desc.size as usize {
            let payload = size
                .max(self.current_region_size.saturating_mul(2))
                .min(self.max_region_size);
            if payload < size {
                warn!(size, cap = self.max_region_size, "allocation exceeds region size cap");
                return None;
            }

            if let Err(e) = self.create_region(payload) {
                warn!(error = %e, "failed to grow region chain");
                return None;
            }
            self.current_region_size = payload;
            header.bump_sequence();

            let desc = self.regions.last()?.descriptor();
            used = desc.used.load(Ordering::Acquire) as usize;
            aligned = align_up(used, align);
            if aligned + size > desc.size as usize {
                warn!(size, align, "allocation does not fit a fresh region");
                return None;
            }
        }

        let current = self.regions.last()?;
        let desc = current.descriptor();
        desc.used.store((aligned + size) as u64, Ordering::Release);

        Some(Allocation {
            region_id: current.id,
            offset: aligned as u64,
            ptr: unsafe { current.shm.region().as_ptr().add(aligned) },
        })
    }

    /// Mapped view of region `region_id`, if it belongs to this chain.
    pub fn region_data(&self, region_id: u64) -> Option<Region> {
        self.regions
            .iter()
            .find(|r| r.id == region_id)
            .map(|r| r.shm.region())
    }

    /// Reverse lookup: which region and offset does `ptr` live at?
    ///
    /// The `(base, size)` span check over the handful of live regions is the
    /// direct derivation; no index needed.
    pub fn locate(&self, ptr: *const u8) -> Option<(u64, u64)> {
        for r in &self.regions {
            let region = r.shm.region();
            if region.contains(ptr) {
                let offset = ptr as usize - region.as_ptr() as usize;
                return Some((r.id, offset as u64));
            }
        }
        None
    }

    /// Number of regions in the chain.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}
