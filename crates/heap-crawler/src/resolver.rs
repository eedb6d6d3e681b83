//! Address to entity lookups.

use rustc_hash::FxHashMap;
use snapshot_memory::{Address, HeapReader, MemoryReader};

use crate::snapshot::Snapshot;
use crate::types::TypeIndex;

/// Maps raw addresses found in memory to snapshot entities.
///
/// Implementations must be deterministic for a fixed snapshot: the same
/// address always resolves the same way.
pub trait AddressResolver {
    /// Runtime type of the heap object at `address`.
    fn find_type_of_address(&self, heap: &HeapReader<'_>, address: Address) -> Option<TypeIndex>;

    /// Native object living at `address`.
    fn find_native_object_of_address(&self, address: Address) -> Option<usize>;

    /// GC handle whose target is `address`.
    fn find_gc_handle_of_target_address(&self, address: Address) -> Option<usize>;
}

/// Lookup tables built from a snapshot's type, native object and handle
/// lists.
///
/// A heap object's first word points either at its class structure or at a
/// vtable whose first word does. Both are tried, class first.
#[derive(Debug, Clone, Default)]
pub struct SnapshotResolver {
    types_by_class: FxHashMap<Address, TypeIndex>,
    native_by_address: FxHashMap<Address, usize>,
    handle_by_target: FxHashMap<Address, usize>,
}

impl SnapshotResolver {
    /// Index a snapshot. Later duplicates lose to earlier entries.
    #[must_use]
    pub fn new(snapshot: &Snapshot) -> Self {
        let mut resolver = Self::default();

        for (index, ty) in snapshot.types.iter() {
            if ty.type_info_address != 0 {
                resolver
                    .types_by_class
                    .entry(ty.type_info_address)
                    .or_insert(index);
            }
        }
        for native in &snapshot.native_objects {
            if native.address != 0 {
                resolver
                    .native_by_address
                    .entry(native.address)
                    .or_insert(native.index);
            }
        }
        for handle in &snapshot.gc_handles {
            if handle.target_address != 0 {
                resolver
                    .handle_by_target
                    .entry(handle.target_address)
                    .or_insert(handle.index);
            }
        }

        resolver
    }
}

impl AddressResolver for SnapshotResolver {
    fn find_type_of_address(&self, heap: &HeapReader<'_>, address: Address) -> Option<TypeIndex> {
        let class_word = heap.read_pointer(address)?;
        if class_word == 0 {
            return None;
        }
        if let Some(&index) = self.types_by_class.get(&class_word) {
            return Some(index);
        }
        let class = heap.read_pointer(class_word)?;
        self.types_by_class.get(&class).copied()
    }

    fn find_native_object_of_address(&self, address: Address) -> Option<usize> {
        self.native_by_address.get(&address).copied()
    }

    fn find_gc_handle_of_target_address(&self, address: Address) -> Option<usize> {
        self.handle_by_target.get(&address).copied()
    }
}
