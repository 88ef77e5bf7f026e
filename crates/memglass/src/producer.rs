//! Producer façade: session lifecycle and typed allocation.
//!
//! A [`Producer`] owns the header segment and the region chain for one
//! session. Structural mutations (schema publication, object registration
//! and destruction, region growth) are serialized behind internal mutexes;
//! field updates go straight through the returned [`Shared`] handles and the
//! synchronization wrappers embedded in the published types.
//!
//! The module-level free functions ([`init`], [`create`], …) manage the
//! process-wide singleton session for programs that want the C-style global
//! entry points.

use std::collections::HashMap;
use std::mem::{align_of, size_of};
use std::path::PathBuf;
use std::ptr::NonNull;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use memglass_shm::{MmapSegment, names};
use tracing::{info, warn};

use crate::alloc::RegionManager;
use crate::directory::ObjectDirectory;
use crate::error::Error;
use crate::layout::{
    HEADER_MAGIC, HeaderLayout, PROTOCOL_VERSION, SESSION_HEADER_SIZE, SessionHeader, put_name,
};
use crate::schema::{Observed, Schema};

use core::sync::atomic::Ordering;

/// Producer configuration. Defaults match the documented session limits.
#[derive(Debug, Clone)]
pub struct Config {
    /// Payload size of the first data region.
    pub initial_region_size: usize,
    /// Cap on the payload size of any single region.
    pub max_region_size: usize,
    /// Type table capacity.
    pub max_types: u32,
    /// Field-entry pool capacity.
    pub max_fields: u32,
    /// Object directory capacity.
    pub max_objects: u32,
    /// Directory holding the named segments.
    pub shm_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_region_size: 1024 * 1024,
            max_region_size: 64 * 1024 * 1024,
            max_types: 256,
            max_fields: 4096,
            max_objects: 4096,
            shm_dir: PathBuf::from(names::DEFAULT_SHM_DIR),
        }
    }
}

/// A handle to an object living in session shared memory.
///
/// The pointee stays valid and at a stable address for the remainder of the
/// session, including after [`Producer::destroy`] (destroyed objects are
/// unadvertised, not reclaimed).
pub struct Shared<T> {
    ptr: NonNull<T>,
}

impl<T> Shared<T> {
    fn new(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T> std::ops::Deref for Shared<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> std::ops::DerefMut for Shared<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }
}

unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Sync> Sync for Shared<T> {}

/// A handle to a contiguous array of objects in session shared memory.
pub struct SharedArray<T> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T> SharedArray<T> {
    #[inline]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> std::ops::Deref for SharedArray<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> std::ops::DerefMut for SharedArray<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

unsafe impl<T: Send> Send for SharedArray<T> {}
unsafe impl<T: Sync> Sync for SharedArray<T> {}

/// The producer side of a session.
pub struct Producer {
    session: String,
    header_shm: MmapSegment,
    regions: Mutex<RegionManager>,
    objects: Mutex<ObjectDirectory>,
    type_ids: HashMap<String, u32>,
}

impl Producer {
    /// Create the session: header segment, directories, region 1, schema.
    pub fn init(session: &str, config: Config, schema: Schema) -> Result<Self, Error> {
        if !names::valid_session_name(session) {
            return Err(Error::InvalidSessionName);
        }

        let layout = HeaderLayout::compute(config.max_types, config.max_fields, config.max_objects);
        let header_path = names::header_path(&config.shm_dir, session);
        let header_shm = MmapSegment::create(&header_path, layout.total_size)?;
        let region = header_shm.region();

        // The backing file was truncated on create, so the directories start
        // zeroed; only the header record needs explicit initialization.
        let header = unsafe { region.get_mut::<SessionHeader>(0) };
        header.magic = HEADER_MAGIC;
        header.version = PROTOCOL_VERSION;
        header.header_size = SESSION_HEADER_SIZE as u32;
        header.sequence.store(0, Ordering::Release);
        header.type_table_offset = layout.type_table_offset as u64;
        header.type_table_capacity = config.max_types;
        header.type_count.store(0, Ordering::Release);
        header.field_pool_offset = layout.field_pool_offset as u64;
        header.field_pool_capacity = config.max_fields;
        header.field_count.store(0, Ordering::Release);
        header.object_dir_offset = layout.object_dir_offset as u64;
        header.object_dir_capacity = config.max_objects;
        header.object_count.store(0, Ordering::Release);
        header.first_region_id.store(0, Ordering::Release);
        put_name(&mut header.session_name, session);
        header.producer_pid = std::process::id() as u64;
        header.start_timestamp = now_ns();

        let regions = RegionManager::init(
            session,
            &config.shm_dir,
            config.initial_region_size,
            config.max_region_size,
            header,
        )?;

        let type_ids = schema.publish(region, header)?;

        info!(session, types = type_ids.len(), "session initialized");

        Ok(Self {
            session: session.to_string(),
            header_shm,
            regions: Mutex::new(regions),
            objects: Mutex::new(ObjectDirectory::new()),
            type_ids,
        })
    }

    /// Session name.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Current sequence counter.
    pub fn sequence(&self) -> u64 {
        self.header().sequence.load(Ordering::Acquire)
    }

    /// Create a zero-initialized instance of `T` labelled `label`.
    ///
    /// Returns `None` when `T` is not in the schema, the directory is full,
    /// or the allocator is exhausted (reasons are logged).
    pub fn create<T: Observed>(&self, label: &str) -> Option<Shared<T>> {
        let ptr = self.create_raw(T::TYPE_NAME, label, size_of::<T>(), align_of::<T>())?;
        Some(Shared::new(ptr.cast()))
    }

    /// Create an instance of `T` with an initial value.
    pub fn create_with<T: Observed>(&self, label: &str, initial: T) -> Option<Shared<T>> {
        let ptr = self.create_raw(T::TYPE_NAME, label, size_of::<T>(), align_of::<T>())?;
        let ptr: NonNull<T> = ptr.cast();
        unsafe { ptr.as_ptr().write(initial) };
        Some(Shared::new(ptr))
    }

    /// Create a zero-initialized array of `count` instances of `T`.
    pub fn create_array<T: Observed>(&self, label: &str, count: usize) -> Option<SharedArray<T>> {
        if count == 0 {
            return None;
        }
        let ptr = self.create_raw(T::TYPE_NAME, label, size_of::<T>() * count, align_of::<T>())?;
        Some(SharedArray {
            ptr: ptr.cast(),
            len: count,
        })
    }

    fn create_raw(
        &self,
        type_name: &str,
        label: &str,
        size: usize,
        align: usize,
    ) -> Option<NonNull<u8>> {
        let Some(&type_id) = self.type_ids.get(type_name) else {
            warn!(type_name, label, "create for unregistered type");
            return None;
        };

        let allocation = {
            let mut regions = lock(&self.regions);
            regions.allocate(size, align, self.header())?
        };
        unsafe { std::ptr::write_bytes(allocation.ptr, 0, size) };

        let registered = lock(&self.objects).register(
            self.header_shm.region(),
            self.header(),
            allocation.ptr,
            type_id,
            (allocation.region_id, allocation.offset),
            label,
        );
        if let Err(e) = registered {
            warn!(label, error = %e, "object registration failed");
            return None;
        }

        NonNull::new(allocation.ptr)
    }

    /// Mark an object destroyed. The memory stays valid but the directory
    /// entry stops advertising it.
    pub fn destroy<T>(&self, obj: Shared<T>) {
        let destroyed = lock(&self.objects).destroy(
            self.header_shm.region(),
            self.header(),
            obj.as_ptr() as *const u8,
        );
        if !destroyed {
            warn!("destroy of pointer with no directory entry");
        }
    }

    /// Mark an array destroyed.
    pub fn destroy_array<T>(&self, arr: SharedArray<T>) {
        let destroyed = lock(&self.objects).destroy(
            self.header_shm.region(),
            self.header(),
            arr.as_ptr() as *const u8,
        );
        if !destroyed {
            warn!("destroy of pointer with no directory entry");
        }
    }

    /// Slot index of the first alive object labelled `label`.
    pub fn find(&self, label: &str) -> Option<u32> {
        lock(&self.objects).find(self.header_shm.region(), self.header(), label)
    }

    /// Number of alive objects.
    pub fn alive_count(&self) -> usize {
        lock(&self.objects).alive_count(self.header_shm.region(), self.header())
    }

    /// Tear the session down, unmapping and unlinking every segment.
    pub fn shutdown(self) {
        info!(session = %self.session, "session shut down");
        // Segments unlink on drop; the handle owns all of them.
    }

    #[inline]
    fn header(&self) -> &SessionHeader {
        unsafe { self.header_shm.region().get::<SessionHeader>(0) }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

// ── process-wide session ───────────────────────────────────────────────────

static GLOBAL: Mutex<Option<Producer>> = Mutex::new(None);

/// Initialize the process-wide session.
///
/// Fails with [`Error::AlreadyInitialized`] when a session already exists in
/// this process.
pub fn init(session: &str, config: Config, schema: Schema) -> Result<(), Error> {
    let mut global = lock(&GLOBAL);
    if global.is_some() {
        return Err(Error::AlreadyInitialized);
    }
    *global = Some(Producer::init(session, config, schema)?);
    Ok(())
}

/// Shut the process-wide session down. Idempotent.
pub fn shutdown() {
    if let Some(producer) = lock(&GLOBAL).take() {
        producer.shutdown();
    }
}

/// `Producer::create` on the process-wide session.
pub fn create<T: Observed>(label: &str) -> Option<Shared<T>> {
    lock(&GLOBAL).as_ref()?.create(label)
}

/// `Producer::create_with` on the process-wide session.
pub fn create_with<T: Observed>(label: &str, initial: T) -> Option<Shared<T>> {
    lock(&GLOBAL).as_ref()?.create_with(label, initial)
}

/// `Producer::create_array` on the process-wide session.
pub fn create_array<T: Observed>(label: &str, count: usize) -> Option<SharedArray<T>> {
    lock(&GLOBAL).as_ref()?.create_array(label, count)
}

/// `Producer::destroy` on the process-wide session.
pub fn destroy<T>(obj: Shared<T>) {
    if let Some(producer) = lock(&GLOBAL).as_ref() {
        producer.destroy(obj);
    }
}
