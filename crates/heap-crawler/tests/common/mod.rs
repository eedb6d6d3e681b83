//! Hand-built snapshots for the integration tests.
#![allow(dead_code)]

use heap_crawler::{
    FieldDescription, NativeTypeDescription, Snapshot, SnapshotBuilder, TypeDescription,
    TypeIndex,
};
use snapshot_memory::{Address, VirtualMachineInformation};

/// Start of the captured heap segment.
pub const HEAP_BASE: Address = 0x1000;
/// Size of the captured heap segment.
pub const HEAP_SIZE: usize = 0x1_0000;

/// Runtime class address given to the type at `index`.
pub const fn class_of(index: TypeIndex) -> Address {
    0x7000_0000 + index as Address * 0x100
}

/// A snapshot under construction, with the core types already registered.
pub struct Fixture {
    pub vm: VirtualMachineInformation,
    pub builder: SnapshotBuilder,
    pub memory: Vec<u8>,
    type_count: usize,
    pub object: TypeIndex,
    pub int32: TypeIndex,
    pub intptr: TypeIndex,
    pub string: TypeIndex,
    pub engine: TypeIndex,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_vm(VirtualMachineInformation::mono_64bit())
    }

    pub fn with_vm(vm: VirtualMachineInformation) -> Self {
        let mut fixture = Self {
            vm,
            builder: SnapshotBuilder::new(vm),
            memory: vec![0; HEAP_SIZE],
            type_count: 0,
            object: 0,
            int32: 0,
            intptr: 0,
            string: 0,
            engine: 0,
        };
        let header = u64::from(vm.object_header_size);
        fixture.object = fixture.add_type(TypeDescription::class("System.Object", header));
        fixture.int32 = fixture.add_type(TypeDescription::value_type("System.Int32", 4));
        fixture.intptr = fixture.add_type(TypeDescription::value_type(
            "System.IntPtr",
            u64::from(vm.pointer_size),
        ));
        fixture.string = fixture.add_type(
            TypeDescription::class("System.String", header + 8).with_base(fixture.object),
        );
        fixture.engine = fixture.add_type(
            TypeDescription::class("UnityEngine.Object", header + u64::from(vm.pointer_size))
                .with_base(fixture.object)
                .with_field(FieldDescription::instance(
                    "m_CachedPtr",
                    header,
                    fixture.intptr,
                )),
        );
        fixture.builder.engine_object_type(fixture.engine);
        fixture
    }

    /// Register a type whose instances carry `class_of(index)` as class word.
    pub fn add_type(&mut self, ty: TypeDescription) -> TypeIndex {
        let index = self.type_count;
        let added = self
            .builder
            .add_type(ty.with_type_info_address(class_of(index)));
        assert_eq!(added, index);
        self.type_count += 1;
        index
    }

    /// Index the next registered type will get.
    pub fn next_type_index(&self) -> TypeIndex {
        self.type_count
    }

    /// A reference type deriving from `System.Object`.
    pub fn add_class(&mut self, name: &str, size: u64, fields: &[(&str, u64, TypeIndex)]) -> TypeIndex {
        let mut ty = TypeDescription::class(name, size).with_base(self.object);
        for &(field, offset, type_index) in fields {
            ty = ty.with_field(FieldDescription::instance(field, offset, type_index));
        }
        self.add_type(ty)
    }

    /// A value type.
    pub fn add_struct(&mut self, name: &str, size: u64, fields: &[(&str, u64, TypeIndex)]) -> TypeIndex {
        let mut ty = TypeDescription::value_type(name, size);
        for &(field, offset, type_index) in fields {
            ty = ty.with_field(FieldDescription::instance(field, offset, type_index));
        }
        self.add_type(ty)
    }

    /// A single-dimension array type.
    pub fn add_array(&mut self, name: &str, element: TypeIndex, element_size: u64) -> TypeIndex {
        self.add_type(TypeDescription::array(name, element, element_size))
    }

    pub fn header(&self) -> u64 {
        u64::from(self.vm.object_header_size)
    }

    pub fn pointer_size(&self) -> u64 {
        u64::from(self.vm.pointer_size)
    }

    fn offset(&self, address: Address) -> usize {
        usize::try_from(address - HEAP_BASE).unwrap()
    }

    pub fn write_u32(&mut self, address: Address, value: u32) {
        let at = self.offset(address);
        self.memory[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn write_pointer(&mut self, address: Address, value: Address) {
        let at = self.offset(address);
        if self.vm.pointer_size == 4 {
            let value = u32::try_from(value).unwrap();
            self.memory[at..at + 4].copy_from_slice(&value.to_le_bytes());
        } else {
            self.memory[at..at + 8].copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Put an object of `type_index` at `address`.
    pub fn place(&mut self, address: Address, type_index: TypeIndex) {
        self.write_pointer(address, class_of(type_index));
    }

    /// Put a single-dimension array with `length` elements at `address`.
    pub fn place_array(&mut self, address: Address, type_index: TypeIndex, length: u32) {
        self.place(address, type_index);
        let size_offset = u64::from(self.vm.array_size_offset_in_header);
        self.write_u32(address + size_offset, length);
    }

    /// Address of element `index` of an array at `address`.
    pub fn element(&self, address: Address, index: u64, element_size: u64) -> Address {
        address + u64::from(self.vm.array_header_size) + index * element_size
    }

    pub fn native_type(&mut self, name: &str) -> usize {
        self.builder.add_native_type(NativeTypeDescription::new(name))
    }

    pub fn build(mut self) -> Snapshot {
        self.builder.add_segment(HEAP_BASE, self.memory);
        self.builder.build().unwrap()
    }
}

/// Check the structural invariants every crawl result must hold.
pub fn assert_consistent(snapshot: &Snapshot) {
    use heap_crawler::ConnectionKind;
    use std::collections::HashSet;

    let graph = &snapshot.graph;
    let mut addresses = HashSet::new();
    for (index, record) in graph.objects.iter().enumerate() {
        assert_ne!(record.address, 0, "object {index} has a null address");
        assert!(addresses.insert(record.address), "address {:#x} registered twice", record.address);
        assert_eq!(record.identity, heap_crawler::ObjectIdentity::Heap(index));
        assert!(record.static_storage.is_none());
    }

    for connection in graph.connections.iter() {
        for endpoint in [connection.from, connection.to] {
            let bound = match endpoint.kind {
                ConnectionKind::GcHandle => snapshot.gc_handles.len(),
                ConnectionKind::Native => snapshot.native_objects.len(),
                ConnectionKind::Managed => graph.objects.len(),
                ConnectionKind::StaticField => graph.static_fields.len(),
            };
            assert!(endpoint.index < bound, "dangling endpoint {endpoint:?}");
        }
    }

    for (index, field) in graph.static_fields.iter().enumerate() {
        assert_eq!(field.own_index, index);
    }
}
