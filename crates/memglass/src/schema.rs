//! Schema ingestion and publication.
//!
//! The schema is handed to the producer as a sequence of type descriptors —
//! typically emitted by a build-time extractor, hand-written in tests and
//! demos. Publication writes the descriptors into the header's type table
//! and field pool, assigning each user type an id hashed from its name, and
//! flattens nested struct fields into dotted leaf entries so observers can
//! resolve `"quote.bid_price"` with a single lookup.

use std::collections::HashMap;

use memglass_shm::Region;
use tracing::debug;

use crate::error::Error;
use crate::layout::{
    Atomicity, PrimitiveType, SessionHeader, USER_TYPE_BASE, field_entry_mut, field_flags,
    put_name, type_entry_mut,
};

/// Marker for types whose instances may be published into a session.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with no padding-sensitive interior
/// (trivially copyable, standard layout), and `TYPE_NAME` must match the
/// name under which the type's descriptor is registered in the schema.
pub unsafe trait Observed: Sized {
    const TYPE_NAME: &'static str;
}

/// One field of a described type, as the extractor reports it.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    /// Byte offset within the type
    pub offset: u32,
    /// Field size in bytes (whole array for array fields)
    pub size: u32,
    /// Primitive tag or the id of a previously registered user type
    pub type_id: u32,
    /// Element count for array fields, 0 otherwise
    pub array_size: u32,
    pub atomicity: Atomicity,
    pub readonly: bool,
}

impl FieldDescriptor {
    /// A scalar field of primitive type.
    pub fn primitive(
        name: &str,
        offset: usize,
        size: usize,
        ty: PrimitiveType,
        atomicity: Atomicity,
    ) -> Self {
        Self {
            name: name.to_string(),
            offset: offset as u32,
            size: size as u32,
            type_id: ty as u32,
            array_size: 0,
            atomicity,
            readonly: false,
        }
    }

    /// A nested struct field referencing a registered user type.
    pub fn nested(name: &str, offset: usize, size: usize, user_type_id: u32) -> Self {
        Self {
            name: name.to_string(),
            offset: offset as u32,
            size: size as u32,
            type_id: user_type_id,
            array_size: 0,
            atomicity: Atomicity::None,
            readonly: false,
        }
    }

    /// A fixed-size array of a primitive type.
    pub fn array(
        name: &str,
        offset: usize,
        size: usize,
        ty: PrimitiveType,
        count: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            offset: offset as u32,
            size: size as u32,
            type_id: ty as u32,
            array_size: count,
            atomicity: Atomicity::None,
            readonly: false,
        }
    }

    /// Mark the field read-only for observers.
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Override the atomicity tag (builder style).
    pub fn with_atomicity(mut self, atomicity: Atomicity) -> Self {
        self.atomicity = atomicity;
        self
    }
}

/// One type as the extractor reports it.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: String,
    pub size: u32,
    pub alignment: u32,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: &str, size: usize, alignment: usize) -> Self {
        Self {
            name: name.to_string(),
            size: size as u32,
            alignment: alignment as u32,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }
}

/// The ordered set of types a producer publishes.
#[derive(Debug, Default)]
pub struct Schema {
    types: Vec<(u32, TypeDescriptor)>,
    by_name: HashMap<String, u32>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type and return its assigned id.
    ///
    /// Ids are a hash of the type name lifted into the user-type space;
    /// collisions bump linearly, so ids are stable for a fixed registration
    /// order. Registering the same name twice returns the original id.
    pub fn register(&mut self, desc: TypeDescriptor) -> u32 {
        if let Some(&id) = self.by_name.get(&desc.name) {
            return id;
        }

        let mut id = hash_type_name(&desc.name);
        while self.types.iter().any(|(existing, _)| *existing == id) {
            id += 1;
        }

        self.by_name.insert(desc.name.clone(), id);
        self.types.push((id, desc));
        id
    }

    /// Id previously assigned to `name`, if any.
    pub fn type_id(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    fn descriptor(&self, id: u32) -> Option<&TypeDescriptor> {
        self.types
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, desc)| desc)
    }

    /// Write every registered type into the header directories.
    ///
    /// Each published type bumps the session sequence after its entries are
    /// in place. Returns the name → id map the producer uses for
    /// `create<T>` lookups.
    pub(crate) fn publish(
        &self,
        region: Region,
        header: &SessionHeader,
    ) -> Result<HashMap<String, u32>, Error> {
        use core::sync::atomic::Ordering;

        let mut field_index = header.field_count.load(Ordering::Acquire);
        let mut type_index = header.type_count.load(Ordering::Acquire);

        for (type_id, desc) in &self.types {
            if type_index >= header.type_table_capacity {
                return Err(Error::TypeTableFull);
            }

            let first_field = field_index;
            for field in &desc.fields {
                field_index = self.publish_field(region, header, field_index, field, None)?;
            }

            let entry = unsafe { type_entry_mut(region, header, type_index) };
            entry.type_id = *type_id;
            entry.size = desc.size;
            entry.alignment = desc.alignment;
            entry.field_count = field_index - first_field;
            entry.fields_offset = first_field as u64;
            put_name(&mut entry.name, &desc.name);

            type_index += 1;
            header.type_count.store(type_index, Ordering::Release);
            header.field_count.store(field_index, Ordering::Release);
            header.bump_sequence();

            debug!(
                type_name = %desc.name,
                type_id,
                fields = entry.field_count,
                "published type"
            );
        }

        Ok(self.by_name.clone())
    }

    /// Write one field entry, then the flattened dotted entries of its
    /// nested leaves when the field is a (non-array) struct.
    fn publish_field(
        &self,
        region: Region,
        header: &SessionHeader,
        mut index: u32,
        field: &FieldDescriptor,
        prefix: Option<(&str, u32)>,
    ) -> Result<u32, Error> {
        if index >= header.field_pool_capacity {
            return Err(Error::FieldPoolFull);
        }

        let (name, base_offset) = match prefix {
            Some((parent, parent_offset)) => {
                (format!("{parent}.{}", field.name), parent_offset + field.offset)
            }
            None => (field.name.clone(), field.offset),
        };

        let nested = field.type_id >= USER_TYPE_BASE && field.array_size == 0;

        let mut flags = 0u32;
        if field.array_size > 0 {
            flags |= field_flags::IS_ARRAY;
        }
        if nested {
            flags |= field_flags::IS_NESTED;
        }
        if field.readonly {
            flags |= field_flags::READ_ONLY;
        }

        let entry = unsafe { field_entry_mut(region, header, index) };
        entry.offset = base_offset;
        entry.size = field.size;
        entry.type_id = field.type_id;
        entry.flags = flags;
        entry.array_size = field.array_size;
        entry.atomicity = field.atomicity as u8;
        entry._pad = [0; 3];
        put_name(&mut entry.name, &name);
        index += 1;

        if nested {
            let inner = self
                .descriptor(field.type_id)
                .ok_or(Error::TypeNotRegistered)?;
            for inner_field in &inner.fields {
                index = self.publish_field(
                    region,
                    header,
                    index,
                    inner_field,
                    Some((&name, base_offset)),
                )?;
            }
        }

        Ok(index)
    }
}

/// djb2 over the type name, lifted into the user-type id space.
pub fn hash_type_name(name: &str) -> u32 {
    let mut hash: u32 = 5381;
    for &b in name.as_bytes() {
        hash = hash.wrapping_shl(5).wrapping_add(hash).wrapping_add(b as u32);
    }
    hash | USER_TYPE_BASE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_land_in_the_user_type_space() {
        assert!(hash_type_name("Quote") >= USER_TYPE_BASE);
        assert!(hash_type_name("") >= USER_TYPE_BASE);
    }

    #[test]
    fn registration_is_idempotent_per_name() {
        let mut schema = Schema::new();
        let a = schema.register(TypeDescriptor::new("Quote", 16, 8));
        let b = schema.register(TypeDescriptor::new("Quote", 16, 8));
        assert_eq!(a, b);
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn distinct_names_get_distinct_ids() {
        let mut schema = Schema::new();
        let a = schema.register(TypeDescriptor::new("Quote", 16, 8));
        let b = schema.register(TypeDescriptor::new("Position", 32, 8));
        assert_ne!(a, b);
        assert_eq!(schema.type_id("Quote"), Some(a));
        assert_eq!(schema.type_id("Position"), Some(b));
        assert_eq!(schema.type_id("Order"), None);
    }
}
