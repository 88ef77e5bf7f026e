//! Observer: attach to a session and read fields by name.
//!
//! Observers share nothing with the producer except the mapped segments.
//! [`Observer::refresh`] re-reads the directories only when the header
//! sequence moved, and maps newly discovered regions by walking the
//! `first_region_id` / `next_region_id` chain with acquire loads. Mapped
//! regions are never remapped, so data pointers handed out earlier stay
//! valid across refreshes.

use std::collections::HashMap;
use std::io;
use std::mem::size_of;
use std::path::{Path, PathBuf};

use memglass_shm::{MmapSegment, names};
use tracing::{debug, warn};

use crate::error::Error;
use crate::layout::{
    Atomicity, FieldEntry, ObjectState, PROTOCOL_VERSION, RegionDescriptor, SESSION_HEADER_SIZE,
    SessionHeader, field_entry, object_entry, type_entry,
};
use crate::sync::{Seqlock, SpinLock, atomic_load, atomic_store};

use core::sync::atomic::Ordering;

/// A type as mirrored from the session's type table.
#[derive(Debug, Clone)]
pub struct ObservedType {
    pub type_id: u32,
    pub name: String,
    pub size: u32,
    pub alignment: u32,
    /// All field entries, flattened dotted leaves included.
    pub fields: Vec<FieldEntry>,
}

impl ObservedType {
    pub fn field(&self, name: &str) -> Option<&FieldEntry> {
        self.fields.iter().find(|f| f.name() == name)
    }
}

/// A directory entry as mirrored by the observer.
#[derive(Debug, Clone)]
pub struct ObservedObject {
    pub label: String,
    pub type_name: String,
    pub type_id: u32,
    pub region_id: u64,
    pub offset: u64,
    pub generation: u64,
}

/// The observer side of a session.
#[derive(Debug)]
pub struct Observer {
    session: String,
    dir: PathBuf,
    header_shm: MmapSegment,
    types: Vec<ObservedType>,
    type_index: HashMap<u32, usize>,
    regions: HashMap<u64, MmapSegment>,
    last_sequence: u64,
}

impl Observer {
    /// Attach to `session` under the default shared-memory directory.
    pub fn connect(session: &str) -> Result<Self, Error> {
        Self::connect_in(Path::new(names::DEFAULT_SHM_DIR), session)
    }

    /// Attach to `session` under `dir`.
    ///
    /// Rejects segments with the wrong magic or protocol version.
    pub fn connect_in(dir: &Path, session: &str) -> Result<Self, Error> {
        let path = names::header_path(dir, session);
        let header_shm = MmapSegment::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::HeaderNotFound
            } else {
                Error::MappingFailed(e)
            }
        })?;

        if header_shm.len() < SESSION_HEADER_SIZE {
            return Err(Error::BadMagic);
        }

        let header = unsafe { header_shm.region().get::<SessionHeader>(0) };
        if header.magic != crate::layout::HEADER_MAGIC {
            return Err(Error::BadMagic);
        }
        if header.version != PROTOCOL_VERSION {
            return Err(Error::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: header.version,
            });
        }

        let mut observer = Self {
            session: session.to_string(),
            dir: dir.to_path_buf(),
            header_shm,
            types: Vec::new(),
            type_index: HashMap::new(),
            regions: HashMap::new(),
            last_sequence: u64::MAX,
        };
        observer.refresh();
        debug!(session, "observer connected");
        Ok(observer)
    }

    /// Re-read the directories if the producer published anything new.
    pub fn refresh(&mut self) {
        let sequence = self.header().sequence.load(Ordering::Acquire);
        if sequence == self.last_sequence {
            return;
        }
        self.load_types();
        self.load_regions();
        self.last_sequence = sequence;
    }

    /// Session name as recorded in the header.
    pub fn session_name(&self) -> &str {
        self.header().session_name()
    }

    /// Producer process id.
    pub fn producer_pid(&self) -> u64 {
        self.header().producer_pid
    }

    /// Session start, nanoseconds since the Unix epoch.
    pub fn start_timestamp(&self) -> u64 {
        self.header().start_timestamp
    }

    /// Current sequence counter (acquire).
    pub fn sequence(&self) -> u64 {
        self.header().sequence.load(Ordering::Acquire)
    }

    /// Types mirrored at the last refresh.
    pub fn types(&self) -> &[ObservedType] {
        &self.types
    }

    /// Mirrored type with the given id.
    pub fn type_by_id(&self, type_id: u32) -> Option<&ObservedType> {
        self.type_index.get(&type_id).map(|&i| &self.types[i])
    }

    /// Every `Alive` directory entry.
    pub fn objects(&self) -> Vec<ObservedObject> {
        let header = self.header();
        let region = self.header_shm.region();
        let count = header.object_count.load(Ordering::Acquire);

        (0..count)
            .filter_map(|i| {
                let entry = unsafe { object_entry(region, header, i) };
                (entry.state() == ObjectState::Alive).then(|| self.observed(entry))
            })
            .collect()
    }

    /// First `Alive` object labelled `label`, as a typed view.
    pub fn find(&self, label: &str) -> Option<ObjectView<'_>> {
        let header = self.header();
        let region = self.header_shm.region();
        let count = header.object_count.load(Ordering::Acquire);

        (0..count).find_map(|i| {
            let entry = unsafe { object_entry(region, header, i) };
            if entry.state() != ObjectState::Alive || entry.label() != label {
                return None;
            }
            self.view(&self.observed(entry))
        })
    }

    /// Typed view of a previously enumerated object.
    ///
    /// Returns `None` when the object's region is not mapped (yet).
    pub fn view(&self, obj: &ObservedObject) -> Option<ObjectView<'_>> {
        let data = self.object_data(obj.region_id, obj.offset)?;
        Some(ObjectView {
            observer: self,
            ty: self.type_by_id(obj.type_id),
            info: obj.clone(),
            data,
        })
    }

    fn observed(&self, entry: &crate::layout::ObjectEntry) -> ObservedObject {
        ObservedObject {
            label: entry.label().to_string(),
            type_name: self
                .type_by_id(entry.type_id)
                .map(|t| t.name.clone())
                .unwrap_or_default(),
            type_id: entry.type_id,
            region_id: entry.region_id,
            offset: entry.offset,
            generation: entry.generation,
        }
    }

    fn object_data(&self, region_id: u64, offset: u64) -> Option<*mut u8> {
        let shm = self.regions.get(&region_id)?;
        let region = shm.region();
        if offset as usize >= region.len() {
            return None;
        }
        Some(unsafe { region.as_ptr().add(offset as usize) })
    }

    fn load_types(&mut self) {
        self.types.clear();
        self.type_index.clear();

        let loaded: Vec<ObservedType> = {
            let header = self.header();
            let region = self.header_shm.region();
            let count = header.type_count.load(Ordering::Acquire);

            (0..count)
                .map(|i| {
                    let entry = unsafe { type_entry(region, header, i) };
                    let fields = (0..entry.field_count)
                        .map(|j| {
                            *unsafe { field_entry(region, header, entry.fields_offset as u32 + j) }
                        })
                        .collect();

                    ObservedType {
                        type_id: entry.type_id,
                        name: entry.name().to_string(),
                        size: entry.size,
                        alignment: entry.alignment,
                        fields,
                    }
                })
                .collect()
        };

        for observed in loaded {
            self.type_index.insert(observed.type_id, self.types.len());
            self.types.push(observed);
        }
    }

    /// Walk the region chain from the head, mapping anything new.
    ///
    /// The chain end is never cached; each refresh re-walks from the head so
    /// regions appended since the last walk are always found.
    fn load_regions(&mut self) {
        let mut region_id = self.header().first_region_id.load(Ordering::Acquire);

        while region_id != 0 {
            if let Some(shm) = self.regions.get(&region_id) {
                let desc = unsafe { shm.region().get::<RegionDescriptor>(0) };
                region_id = desc.next_region_id.load(Ordering::Acquire);
                continue;
            }

            let path = names::region_path(&self.dir, &self.session, region_id);
            let shm = match MmapSegment::open(&path) {
                Ok(shm) => shm,
                Err(e) => {
                    // Keep what we have; the next refresh retries.
                    debug!(region_id, error = %e, "region not mappable yet");
                    break;
                }
            };

            if shm.len() < size_of::<RegionDescriptor>() {
                warn!(region_id, "region segment too small");
                break;
            }
            let desc = unsafe { shm.region().get::<RegionDescriptor>(0) };
            if !desc.validate() {
                warn!(region_id, "region magic mismatch");
                break;
            }

            let next = desc.next_region_id.load(Ordering::Acquire);
            debug!(region_id, size = shm.len(), "mapped data region");
            self.regions.insert(region_id, shm);
            region_id = next;
        }
    }

    #[inline]
    fn header(&self) -> &SessionHeader {
        unsafe { self.header_shm.region().get::<SessionHeader>(0) }
    }
}

// ── typed views ────────────────────────────────────────────────────────────

/// A live object, resolved to its mapped bytes and mirrored type.
pub struct ObjectView<'a> {
    observer: &'a Observer,
    info: ObservedObject,
    ty: Option<&'a ObservedType>,
    data: *mut u8,
}

impl<'a> ObjectView<'a> {
    /// Directory information for this object.
    pub fn info(&self) -> &ObservedObject {
        &self.info
    }

    /// Mirrored type, when the observer knows it.
    pub fn type_info(&self) -> Option<&'a ObservedType> {
        self.ty
    }

    /// Resolve a field by name.
    ///
    /// Dotted names match the flattened entries first; on a miss the name is
    /// split at the first dot and resolved through the nested type.
    pub fn field(&self, name: &str) -> FieldProxy<'a> {
        if let Some(ty) = self.ty {
            if let Some(field) = ty.fields.iter().find(|f| f.name() == name) {
                return FieldProxy {
                    observer: self.observer,
                    field: Some(field),
                    data: unsafe { self.data.add(field.offset as usize) },
                };
            }

            if let Some((first, rest)) = name.split_once('.') {
                return self.field(first).field(rest);
            }
        }
        FieldProxy::invalid(self.observer)
    }

    /// Copy the whole object out as a `T`.
    ///
    /// The copy is unsynchronized; per-field atomicity does not apply.
    pub fn read_struct<T: Copy>(&self) -> Option<T> {
        let ty = self.ty?;
        if (ty.size as usize) < size_of::<T>() {
            return None;
        }
        Some(unsafe { std::ptr::read(self.data as *const T) })
    }

    /// Raw pointer to the object bytes.
    pub fn data(&self) -> *mut u8 {
        self.data
    }
}

/// A field resolved within an [`ObjectView`].
///
/// Lookup failures produce an *invalid* proxy rather than an error: reads
/// return `T::default()`, writes are no-ops, and [`FieldProxy::is_valid`]
/// reports the state out of band.
pub struct FieldProxy<'a> {
    observer: &'a Observer,
    field: Option<&'a FieldEntry>,
    data: *mut u8,
}

impl<'a> FieldProxy<'a> {
    fn invalid(observer: &'a Observer) -> Self {
        Self {
            observer,
            field: None,
            data: std::ptr::null_mut(),
        }
    }

    /// Whether the lookup chain that produced this proxy succeeded.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.field.is_some() && !self.data.is_null()
    }

    /// Entry metadata, when valid.
    pub fn info(&self) -> Option<&'a FieldEntry> {
        self.field
    }

    /// Resolve a field of a nested struct.
    pub fn field(&self, name: &str) -> FieldProxy<'a> {
        let Some(field) = self.field else {
            return FieldProxy::invalid(self.observer);
        };
        if self.data.is_null() {
            return FieldProxy::invalid(self.observer);
        }

        let Some(ty) = self.observer.type_by_id(field.type_id) else {
            return FieldProxy::invalid(self.observer);
        };

        if let Some(inner) = ty.fields.iter().find(|f| f.name() == name) {
            return FieldProxy {
                observer: self.observer,
                field: Some(inner),
                data: unsafe { self.data.add(inner.offset as usize) },
            };
        }
        if let Some((first, rest)) = name.split_once('.') {
            return self.field(first).field(rest);
        }
        FieldProxy::invalid(self.observer)
    }

    /// Index into an array field.
    pub fn at(&self, index: usize) -> FieldProxy<'a> {
        let Some(field) = self.field else {
            return FieldProxy::invalid(self.observer);
        };
        if self.data.is_null() || !field.is_array() || index >= field.array_size as usize {
            return FieldProxy::invalid(self.observer);
        }

        let stride = (field.size / field.array_size) as usize;
        FieldProxy {
            observer: self.observer,
            field: Some(field),
            data: unsafe { self.data.add(index * stride) },
        }
    }

    /// Read the field under its atomicity tag.
    ///
    /// Invalid proxies and size mismatches yield `T::default()`.
    pub fn get<T: Copy + Default>(&self) -> T {
        let Some(field) = self.field else {
            return T::default();
        };
        if self.data.is_null() || !self.fits::<T>(field) {
            return T::default();
        }

        unsafe {
            match field.atomicity() {
                Atomicity::None => std::ptr::read(self.data as *const T),
                Atomicity::Atomic => atomic_load(self.data as *const T),
                Atomicity::Seqlock => (*(self.data as *const Seqlock<T>)).read(),
                Atomicity::Locked => (*(self.data as *const SpinLock<T>)).read(),
            }
        }
    }

    /// Non-blocking read; `None` for invalid proxies and for seqlock fields
    /// caught mid-write or torn.
    pub fn try_get<T: Copy + Default>(&self) -> Option<T> {
        let field = self.field?;
        if self.data.is_null() || !self.fits::<T>(field) {
            return None;
        }

        if field.atomicity() == Atomicity::Seqlock {
            unsafe { (*(self.data as *const Seqlock<T>)).try_read() }
        } else {
            Some(self.get())
        }
    }

    /// Write the field under its atomicity tag.
    ///
    /// Observer writes race the producer by design; fields tagged
    /// `Atomicity::None` may tear.
    pub fn set<T: Copy>(&self, value: T) {
        let Some(field) = self.field else { return };
        if self.data.is_null() || !self.fits::<T>(field) {
            return;
        }

        unsafe {
            match field.atomicity() {
                Atomicity::None => std::ptr::write(self.data as *mut T, value),
                Atomicity::Atomic => atomic_store(self.data as *mut T, value),
                Atomicity::Seqlock => (*(self.data as *const Seqlock<T>)).write(value),
                Atomicity::Locked => (*(self.data as *const SpinLock<T>)).write(value),
            }
        }
    }

    /// Size guard: the declared field must be able to hold a `T` under the
    /// access path its tag selects.
    fn fits<T: Copy>(&self, field: &FieldEntry) -> bool {
        let needed = match field.atomicity() {
            Atomicity::Seqlock => size_of::<Seqlock<T>>(),
            Atomicity::Locked => size_of::<SpinLock<T>>(),
            _ => size_of::<T>(),
        };
        // Array element proxies keep the whole-array entry, so the declared
        // size may exceed the element size.
        field.size as usize >= needed && needed > 0
    }
}
