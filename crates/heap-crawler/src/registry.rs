//! Discovered managed objects and their identity index.

use rustc_hash::FxHashMap;
use snapshot_memory::Address;

use crate::types::TypeIndex;

/// Stable identity of a crawled object.
///
/// Heap objects index the registry; static-field slots index the static
/// field list. The two spaces never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectIdentity {
    /// Index into [`ObjectRegistry`].
    Heap(usize),
    /// Index into the static field list.
    StaticField(usize),
}

/// Marks data living inside a type's static-field buffer instead of on the
/// heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StaticStorage {
    /// Type whose static buffer holds the data.
    pub type_index: TypeIndex,
}

/// A managed object discovered by the crawler.
///
/// The registry owns one record per heap address. The crawler's work-list
/// holds transient copies that only drive traversal; value-type fields and
/// value-type array elements appear there as copies sharing the parent's
/// identity and are never registered themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedObjectRecord {
    /// Heap address, or an offset into static storage when
    /// `static_storage` is set.
    pub address: Address,
    /// Runtime type.
    pub type_index: TypeIndex,
    /// Identity shared by every copy of this record.
    pub identity: ObjectIdentity,
    /// First GC handle found pointing at this object.
    pub gc_handle_index: Option<usize>,
    /// Paired native object.
    pub native_object_index: Option<usize>,
    /// Byte size, once computed.
    pub size: Option<u64>,
    /// Set when the data lives in static storage.
    pub static_storage: Option<StaticStorage>,
}

impl ManagedObjectRecord {
    /// A heap object with nothing attached yet.
    #[must_use]
    pub const fn heap(address: Address, type_index: TypeIndex, index: usize) -> Self {
        Self {
            address,
            type_index,
            identity: ObjectIdentity::Heap(index),
            gc_handle_index: None,
            native_object_index: None,
            size: None,
            static_storage: None,
        }
    }

    /// Data stored in static storage, owned by static field `slot`.
    #[must_use]
    pub const fn static_slot(
        offset: Address,
        type_index: TypeIndex,
        slot: usize,
        storage: StaticStorage,
    ) -> Self {
        Self {
            address: offset,
            type_index,
            identity: ObjectIdentity::StaticField(slot),
            gc_handle_index: None,
            native_object_index: None,
            size: None,
            static_storage: Some(storage),
        }
    }

    /// A transient copy describing in-line data at `address` of type
    /// `type_index`, sharing this record's identity and storage.
    #[must_use]
    pub const fn alias(&self, address: Address, type_index: TypeIndex) -> Self {
        Self {
            address,
            type_index,
            identity: self.identity,
            gc_handle_index: None,
            native_object_index: None,
            size: None,
            static_storage: self.static_storage,
        }
    }
}

/// One static field slot of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticFieldRecord {
    /// Type declaring the field.
    pub type_index: TypeIndex,
    /// Index of the field in the type's field list.
    pub field_index: usize,
    /// Position of this record in the static field list.
    pub own_index: usize,
}

/// Append-only arena of heap objects with an address index.
///
/// # Invariants
///
/// - Every address maps to at most one record.
/// - `objects[i].identity == ObjectIdentity::Heap(i)`.
/// - A record's size, once set, never changes.
#[derive(Debug, Clone, Default)]
pub struct ObjectRegistry {
    objects: Vec<ManagedObjectRecord>,
    by_address: FxHashMap<Address, usize>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the object registered at `address`.
    #[inline]
    #[must_use]
    pub fn find(&self, address: Address) -> Option<usize> {
        self.by_address.get(&address).copied()
    }

    /// Register a heap object, or return the existing one at `address`.
    ///
    /// The second value is `true` when a new record was created.
    pub fn get_or_insert(&mut self, address: Address, type_index: TypeIndex) -> (usize, bool) {
        if let Some(index) = self.find(address) {
            return (index, false);
        }
        let index = self.objects.len();
        self.objects
            .push(ManagedObjectRecord::heap(address, type_index, index));
        self.by_address.insert(address, index);
        (index, true)
    }

    /// Look up a record.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ManagedObjectRecord> {
        self.objects.get(index)
    }

    /// Set the size of a record that has none yet.
    ///
    /// Returns `false` when the record is missing or already sized.
    pub fn set_size(&mut self, index: usize, size: u64) -> bool {
        match self.objects.get_mut(index) {
            Some(record) if record.size.is_none() => {
                record.size = Some(size);
                true
            }
            _ => false,
        }
    }

    /// Link a GC handle, keeping the first one seen.
    pub fn attach_gc_handle(&mut self, index: usize, handle: usize) {
        if let Some(record) = self.objects.get_mut(index) {
            record.gc_handle_index.get_or_insert(handle);
        }
    }

    /// Link a native object, keeping the first one seen.
    pub fn attach_native_object(&mut self, index: usize, native: usize) {
        if let Some(record) = self.objects.get_mut(index) {
            record.native_object_index.get_or_insert(native);
        }
    }

    /// Number of registered objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over records in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &ManagedObjectRecord> + '_ {
        self.objects.iter()
    }

    /// All records in discovery order.
    #[must_use]
    pub fn as_slice(&self) -> &[ManagedObjectRecord] {
        &self.objects
    }

    /// Forget every record.
    pub fn clear(&mut self) {
        self.objects.clear();
        self.by_address.clear();
    }
}
