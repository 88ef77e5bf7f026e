//! On-wire layout of a memglass session.
//!
//! The header segment starts with a [`SessionHeader`] followed by three
//! inline, append-only arrays: the type table, the field-entry pool and the
//! object directory. Every data region starts with a [`RegionDescriptor`].
//! All of these records are `#[repr(C)]`, trivially copyable, and shared
//! byte-for-byte between the producer and every observer; the atomics inside
//! them carry the cross-process publication protocol.

use core::mem::size_of;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use memglass_shm::Region;

/// Magic at offset 0 of the header segment ("MEMGLASS").
pub const HEADER_MAGIC: u64 = 0x4D45_4D47_4C41_5353;

/// Magic at offset 0 of every data region ("REGNMEMG").
pub const REGION_MAGIC: u64 = 0x5245_474E_4D45_4D47;

/// Protocol version understood by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// First type id in the user-type space; everything below is reserved for
/// primitive tags.
pub const USER_TYPE_BASE: u32 = 0x10000;

/// Primitive field type tags.
///
/// The discriminants are part of the wire format (field entries and the
/// `.mgd` diff stream both carry them).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool = 1,
    Int8 = 2,
    UInt8 = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float32 = 10,
    Float64 = 11,
    Char = 12,
}

impl PrimitiveType {
    #[inline]
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(PrimitiveType::Bool),
            2 => Some(PrimitiveType::Int8),
            3 => Some(PrimitiveType::UInt8),
            4 => Some(PrimitiveType::Int16),
            5 => Some(PrimitiveType::UInt16),
            6 => Some(PrimitiveType::Int32),
            7 => Some(PrimitiveType::UInt32),
            8 => Some(PrimitiveType::Int64),
            9 => Some(PrimitiveType::UInt64),
            10 => Some(PrimitiveType::Float32),
            11 => Some(PrimitiveType::Float64),
            12 => Some(PrimitiveType::Char),
            _ => None,
        }
    }

    /// Integer-like tags are delta-coded in the binary diff stream.
    #[inline]
    pub fn is_integer(self) -> bool {
        !matches!(self, PrimitiveType::Float32 | PrimitiveType::Float64)
    }
}

/// Per-field synchronization selector.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Atomicity {
    /// Direct access; reads may tear.
    #[default]
    None = 0,
    /// Lock-free atomic scalar (release store / acquire load).
    Atomic = 1,
    /// Sequence-locked compound value.
    Seqlock = 2,
    /// Spin-locked compound value.
    Locked = 3,
}

impl Atomicity {
    #[inline]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Atomicity::None),
            1 => Some(Atomicity::Atomic),
            2 => Some(Atomicity::Seqlock),
            3 => Some(Atomicity::Locked),
            _ => None,
        }
    }
}

/// Field flag bits stored in [`FieldEntry::flags`].
pub mod field_flags {
    /// The field is a fixed-size array; `array_size` holds the element count.
    pub const IS_ARRAY: u32 = 1 << 0;
    /// The field is a nested struct; its leaves also appear flattened with
    /// dotted names.
    pub const IS_NESTED: u32 = 1 << 1;
    /// Producers advertise the field as read-only for observers.
    pub const READ_ONLY: u32 = 1 << 2;
}

/// Object directory slot states.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Free = 0,
    Alive = 1,
    Destroyed = 2,
}

impl ObjectState {
    #[inline]
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(ObjectState::Free),
            1 => Some(ObjectState::Alive),
            2 => Some(ObjectState::Destroyed),
            _ => None,
        }
    }
}

// ── header ─────────────────────────────────────────────────────────────────

/// Size of [`SessionHeader`] in bytes.
pub const SESSION_HEADER_SIZE: usize = 160;

/// Bootstrap record at offset 0 of the header segment.
#[repr(C)]
pub struct SessionHeader {
    /// Magic: [`HEADER_MAGIC`]
    pub magic: u64,
    /// Protocol version (1)
    pub version: u32,
    /// Size of this struct (160)
    pub header_size: u32,
    /// Monotonic counter; bumped (release) after every structural mutation
    pub sequence: AtomicU64,
    /// Byte offset of the type table within the header segment
    pub type_table_offset: u64,
    /// Capacity of the type table in entries
    pub type_table_capacity: u32,
    /// Published type count
    pub type_count: AtomicU32,
    /// Byte offset of the field-entry pool
    pub field_pool_offset: u64,
    /// Capacity of the field pool in entries
    pub field_pool_capacity: u32,
    /// Published field count
    pub field_count: AtomicU32,
    /// Byte offset of the object directory
    pub object_dir_offset: u64,
    /// Capacity of the object directory in entries
    pub object_dir_capacity: u32,
    /// Published object count
    pub object_count: AtomicU32,
    /// Id of the first data region (0 = none yet)
    pub first_region_id: AtomicU64,
    /// Session name, NUL-terminated
    pub session_name: [u8; 64],
    /// Producer process id
    pub producer_pid: u64,
    /// Session start, nanoseconds since the Unix epoch
    pub start_timestamp: u64,
}

const _: () = assert!(size_of::<SessionHeader>() == SESSION_HEADER_SIZE);

impl SessionHeader {
    /// Returns `true` if magic, version and header size all match.
    pub fn validate(&self) -> bool {
        self.magic == HEADER_MAGIC
            && self.version == PROTOCOL_VERSION
            && self.header_size == SESSION_HEADER_SIZE as u32
    }

    /// Publish a structural mutation: all prior stores become visible to any
    /// observer that acquires the new sequence value.
    #[inline]
    pub fn bump_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Release) + 1
    }

    pub fn session_name(&self) -> &str {
        name_str(&self.session_name)
    }
}

// ── directory entries ──────────────────────────────────────────────────────

/// One immutable entry in the type table.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TypeEntry {
    /// Hash of the type name, in the user-type space
    pub type_id: u32,
    /// Size of the type in bytes
    pub size: u32,
    /// Alignment of the type in bytes
    pub alignment: u32,
    /// Number of field entries, flattened leaves included
    pub field_count: u32,
    /// Index of the first field entry in the field pool
    pub fields_offset: u64,
    /// Type name, NUL-terminated
    pub name: [u8; 128],
}

const _: () = assert!(size_of::<TypeEntry>() == 152);

impl TypeEntry {
    pub fn name(&self) -> &str {
        name_str(&self.name)
    }
}

/// One entry in the packed field pool.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FieldEntry {
    /// Byte offset within the object
    pub offset: u32,
    /// Size of the field in bytes (whole array for array fields)
    pub size: u32,
    /// Primitive tag or user type id
    pub type_id: u32,
    /// [`field_flags`] bits
    pub flags: u32,
    /// Element count for array fields, 0 otherwise
    pub array_size: u32,
    /// [`Atomicity`] tag
    pub atomicity: u8,
    pub _pad: [u8; 3],
    /// Field name (dotted for flattened nested leaves), NUL-terminated
    pub name: [u8; 64],
}

const _: () = assert!(size_of::<FieldEntry>() == 88);

impl FieldEntry {
    pub fn name(&self) -> &str {
        name_str(&self.name)
    }

    #[inline]
    pub fn atomicity(&self) -> Atomicity {
        Atomicity::from_u8(self.atomicity).unwrap_or(Atomicity::None)
    }

    #[inline]
    pub fn primitive(&self) -> Option<PrimitiveType> {
        PrimitiveType::from_u32(self.type_id)
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.flags & field_flags::IS_ARRAY != 0
    }
}

/// One slot in the object directory.
#[repr(C)]
pub struct ObjectEntry {
    /// [`ObjectState`]; the only mutable word after publication
    pub state: AtomicU32,
    /// References a type table entry
    pub type_id: u32,
    /// Data region holding the object
    pub region_id: u64,
    /// Byte offset within that region (from the region base)
    pub offset: u64,
    /// Slot generation; slots are append-only, so this is 1 in practice
    pub generation: u64,
    /// Instance label, NUL-terminated
    pub label: [u8; 64],
}

const _: () = assert!(size_of::<ObjectEntry>() == 96);

impl ObjectEntry {
    #[inline]
    pub fn state(&self) -> ObjectState {
        ObjectState::from_u32(self.state.load(Ordering::Acquire)).unwrap_or(ObjectState::Free)
    }

    pub fn label(&self) -> &str {
        name_str(&self.label)
    }
}

/// Descriptor at offset 0 of every data region.
#[repr(C)]
pub struct RegionDescriptor {
    /// Magic: [`REGION_MAGIC`]
    pub magic: u64,
    /// Region id (monotonic from 1)
    pub region_id: u64,
    /// Total region size in bytes, descriptor included
    pub size: u64,
    /// Bump pointer; bytes allocated from the region base
    pub used: AtomicU64,
    /// Next region in the chain, 0 = end
    pub next_region_id: AtomicU64,
    /// Segment name, NUL-terminated
    pub shm_name: [u8; 64],
}

pub const REGION_DESCRIPTOR_SIZE: usize = 104;
const _: () = assert!(size_of::<RegionDescriptor>() == REGION_DESCRIPTOR_SIZE);

impl RegionDescriptor {
    pub fn validate(&self) -> bool {
        self.magic == REGION_MAGIC
    }
}

// ── header segment layout ──────────────────────────────────────────────────

/// Computed byte offsets of the three directories within the header segment.
pub struct HeaderLayout {
    pub type_table_offset: usize,
    pub field_pool_offset: usize,
    pub object_dir_offset: usize,
    pub total_size: usize,
}

impl HeaderLayout {
    /// Compute directory offsets for the given capacities.
    ///
    /// Each directory starts on a cache line.
    pub fn compute(max_types: u32, max_fields: u32, max_objects: u32) -> Self {
        let type_table_offset = align_up(SESSION_HEADER_SIZE, 64);
        let type_table_size = max_types as usize * size_of::<TypeEntry>();
        let field_pool_offset = align_up(type_table_offset + type_table_size, 64);
        let field_pool_size = max_fields as usize * size_of::<FieldEntry>();
        let object_dir_offset = align_up(field_pool_offset + field_pool_size, 64);
        let total_size = object_dir_offset + max_objects as usize * size_of::<ObjectEntry>();

        Self {
            type_table_offset,
            field_pool_offset,
            object_dir_offset,
            total_size,
        }
    }
}

/// Align `n` up to a multiple of `align` (power of two).
#[inline]
pub const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

// ── typed directory access ─────────────────────────────────────────────────

/// Type table entry `index` of the header segment `region`.
///
/// # Safety
///
/// `region` must be a mapped header segment whose header is `header`, and
/// `index` must be within the table capacity.
#[inline]
pub unsafe fn type_entry<'a>(region: Region, header: &SessionHeader, index: u32) -> &'a TypeEntry {
    let off = header.type_table_offset as usize + index as usize * size_of::<TypeEntry>();
    unsafe { region.get::<TypeEntry>(off) }
}

/// Field pool entry `index` of the header segment `region`.
///
/// # Safety
///
/// Same contract as [`type_entry`].
#[inline]
pub unsafe fn field_entry<'a>(region: Region, header: &SessionHeader, index: u32) -> &'a FieldEntry {
    let off = header.field_pool_offset as usize + index as usize * size_of::<FieldEntry>();
    unsafe { region.get::<FieldEntry>(off) }
}

/// Object directory slot `index` of the header segment `region`.
///
/// # Safety
///
/// Same contract as [`type_entry`].
#[inline]
pub unsafe fn object_entry<'a>(
    region: Region,
    header: &SessionHeader,
    index: u32,
) -> &'a ObjectEntry {
    let off = header.object_dir_offset as usize + index as usize * size_of::<ObjectEntry>();
    unsafe { region.get::<ObjectEntry>(off) }
}

/// Mutable view of an unpublished type table entry.
///
/// # Safety
///
/// Producer only, and only for entries at or beyond the published
/// `type_count` (nothing else may alias the slot).
#[inline]
pub unsafe fn type_entry_mut<'a>(
    region: Region,
    header: &SessionHeader,
    index: u32,
) -> &'a mut TypeEntry {
    let off = header.type_table_offset as usize + index as usize * size_of::<TypeEntry>();
    unsafe { region.get_mut::<TypeEntry>(off) }
}

/// Mutable view of an unpublished field pool entry.
///
/// # Safety
///
/// Same contract as [`type_entry_mut`].
#[inline]
pub unsafe fn field_entry_mut<'a>(
    region: Region,
    header: &SessionHeader,
    index: u32,
) -> &'a mut FieldEntry {
    let off = header.field_pool_offset as usize + index as usize * size_of::<FieldEntry>();
    unsafe { region.get_mut::<FieldEntry>(off) }
}

/// Mutable view of an unpublished object directory slot.
///
/// # Safety
///
/// Same contract as [`type_entry_mut`].
#[inline]
pub unsafe fn object_entry_mut<'a>(
    region: Region,
    header: &SessionHeader,
    index: u32,
) -> &'a mut ObjectEntry {
    let off = header.object_dir_offset as usize + index as usize * size_of::<ObjectEntry>();
    unsafe { region.get_mut::<ObjectEntry>(off) }
}

// ── fixed-size names ───────────────────────────────────────────────────────

/// Write `s` into a fixed-size NUL-terminated name field, truncating to
/// `dst.len() - 1` bytes.
pub fn put_name(dst: &mut [u8], s: &str) {
    let len = s.len().min(dst.len() - 1);
    dst[..len].copy_from_slice(&s.as_bytes()[..len]);
    dst[len..].fill(0);
}

/// Read a NUL-terminated name field back as a `&str`.
pub fn name_str(src: &[u8]) -> &str {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    core::str::from_utf8(&src[..end]).unwrap_or("")
}
