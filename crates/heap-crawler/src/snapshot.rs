//! The captured snapshot and its builder.

use snapshot_memory::{
    Address, HeapReader, MemorySegment, SegmentTable, VirtualMachineInformation,
};

use crate::crawl::{crawl, CrawlProgress, CrawlSummary, CrawlerConfig};
use crate::error::{CrawlError, SnapshotError};
use crate::graph::ObjectGraph;
use crate::resolver::SnapshotResolver;
use crate::types::{NativeTypeDescription, TypeDescription, TypeIndex, TypeTable};

/// A GC handle captured from the runtime's handle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcHandleRecord {
    /// Position in the handle list.
    pub index: usize,
    /// Address the handle keeps alive; `0` for a freed handle.
    pub target_address: Address,
    /// Managed object the crawl resolved the target to.
    pub managed_object: Option<usize>,
}

/// An engine-side native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeObjectRecord {
    /// Position in the native object list.
    pub index: usize,
    /// Native address.
    pub address: Address,
    /// Index into the native type list.
    pub native_type_index: usize,
    /// Managed wrapper found by the crawl.
    pub managed_object: Option<usize>,
}

/// Everything captured from one process, plus the graph built from it.
///
/// The crawler treats everything except `graph` and the back-links on
/// handles, native objects and native types as read-only.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Layout of the captured virtual machine.
    pub vm: VirtualMachineInformation,
    /// Managed heap memory.
    pub heap: SegmentTable,
    /// Managed types.
    pub types: TypeTable,
    /// Native types.
    pub native_types: Vec<NativeTypeDescription>,
    /// GC handles, in handle table order.
    pub gc_handles: Vec<GcHandleRecord>,
    /// Native objects.
    pub native_objects: Vec<NativeObjectRecord>,
    /// Managed type every engine-backed object derives from.
    pub engine_object_type: Option<TypeIndex>,
    /// Result of the latest crawl.
    pub graph: ObjectGraph,
}

impl Snapshot {
    /// Reader over the managed heap.
    #[must_use]
    pub const fn heap_reader(&self) -> HeapReader<'_> {
        HeapReader::new(&self.heap, self.vm)
    }

    /// Crawl with the default address resolver.
    ///
    /// # Errors
    ///
    /// See [`crawl`].
    pub fn crawl(
        &mut self,
        substitute_addresses: &[Address],
        config: &CrawlerConfig,
        progress: &CrawlProgress,
    ) -> Result<CrawlSummary, CrawlError> {
        let resolver = SnapshotResolver::new(self);
        crawl(self, &resolver, substitute_addresses, config, progress)
    }
}

/// Assembles a [`Snapshot`] and checks its cross references.
///
/// Loaders feed captured data in any order; `add_*` methods return the
/// index the item will have.
///
/// # Example
///
/// ```
/// use heap_crawler::{SnapshotBuilder, TypeDescription};
/// use snapshot_memory::VirtualMachineInformation;
///
/// let mut builder = SnapshotBuilder::new(VirtualMachineInformation::mono_64bit());
/// let object = builder.add_type(TypeDescription::class("System.Object", 16));
/// builder.add_gc_handle(0);
/// let snapshot = builder.build().unwrap();
/// assert_eq!(snapshot.types.get(object).unwrap().name, "System.Object");
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    vm: VirtualMachineInformation,
    segments: Vec<MemorySegment>,
    types: Vec<TypeDescription>,
    native_types: Vec<NativeTypeDescription>,
    gc_handles: Vec<GcHandleRecord>,
    native_objects: Vec<NativeObjectRecord>,
    engine_object_type: Option<TypeIndex>,
}

impl SnapshotBuilder {
    /// Start an empty snapshot for the given VM layout.
    #[must_use]
    pub const fn new(vm: VirtualMachineInformation) -> Self {
        Self {
            vm,
            segments: Vec::new(),
            types: Vec::new(),
            native_types: Vec::new(),
            gc_handles: Vec::new(),
            native_objects: Vec::new(),
            engine_object_type: None,
        }
    }

    /// Add a heap segment.
    pub fn add_segment(&mut self, start: Address, bytes: Vec<u8>) -> &mut Self {
        self.segments.push(MemorySegment::new(start, bytes));
        self
    }

    /// Add a managed type.
    pub fn add_type(&mut self, ty: TypeDescription) -> TypeIndex {
        self.types.push(ty);
        self.types.len() - 1
    }

    /// Add a native type.
    pub fn add_native_type(&mut self, ty: NativeTypeDescription) -> usize {
        self.native_types.push(ty);
        self.native_types.len() - 1
    }

    /// Add a GC handle targeting `target_address`.
    pub fn add_gc_handle(&mut self, target_address: Address) -> usize {
        let index = self.gc_handles.len();
        self.gc_handles.push(GcHandleRecord {
            index,
            target_address,
            managed_object: None,
        });
        index
    }

    /// Add a native object.
    pub fn add_native_object(&mut self, address: Address, native_type_index: usize) -> usize {
        let index = self.native_objects.len();
        self.native_objects.push(NativeObjectRecord {
            index,
            address,
            native_type_index,
            managed_object: None,
        });
        index
    }

    /// Name the managed type every engine-backed object derives from.
    pub fn engine_object_type(&mut self, index: TypeIndex) -> &mut Self {
        self.engine_object_type = Some(index);
        self
    }

    /// Validate and produce the snapshot.
    ///
    /// # Errors
    ///
    /// Fails when the VM layout is unusable, segments overlap, or a base
    /// type, the engine object type or a native object refers to an index
    /// that does not exist. Field type indices are checked during the crawl.
    pub fn build(self) -> Result<Snapshot, SnapshotError> {
        self.vm.validate()?;
        let heap = SegmentTable::new(self.segments)?;

        let type_count = self.types.len();
        for (type_index, ty) in self.types.iter().enumerate() {
            if let Some(base) = ty.base_or_element_type_index {
                if base >= type_count {
                    return Err(SnapshotError::InvalidBaseType {
                        type_index,
                        name: ty.name.clone(),
                        base,
                        type_count,
                    });
                }
            }
        }

        if let Some(engine) = self.engine_object_type {
            if engine >= type_count {
                return Err(SnapshotError::InvalidEngineObjectType(engine));
            }
        }

        let native_type_count = self.native_types.len();
        if let Some(object) = self
            .native_objects
            .iter()
            .find(|o| o.native_type_index >= native_type_count)
        {
            return Err(SnapshotError::InvalidNativeType {
                object: object.index,
                native_type: object.native_type_index,
                native_type_count,
            });
        }

        Ok(Snapshot {
            vm: self.vm,
            heap,
            types: TypeTable::new(self.types),
            native_types: self.native_types,
            gc_handles: self.gc_handles,
            native_objects: self.native_objects,
            engine_object_type: self.engine_object_type,
            graph: ObjectGraph::new(type_count),
        })
    }
}
