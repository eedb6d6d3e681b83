//! Primitive reads over heap segments and static-field storage.

use crate::{Address, SegmentTable, VirtualMachineInformation};

/// Random-access reads of captured memory.
///
/// Every read fails with `None` when the requested range is not fully
/// captured. Failures are terminal for the caller's current field or element;
/// nothing is retried.
pub trait MemoryReader {
    /// Layout of the virtual machine the memory came from.
    fn vm(&self) -> &VirtualMachineInformation;

    /// Borrow `len` bytes at `address`.
    fn read_bytes(&self, address: Address, len: usize) -> Option<&[u8]>;

    /// Read a little-endian `u32`.
    fn read_u32(&self, address: Address) -> Option<u32> {
        self.read_bytes(address, 4)
            .map(bytemuck::pod_read_unaligned::<u32>)
            .map(u32::from_le)
    }

    /// Read a little-endian `i32`.
    fn read_i32(&self, address: Address) -> Option<i32> {
        self.read_bytes(address, 4)
            .map(bytemuck::pod_read_unaligned::<i32>)
            .map(i32::from_le)
    }

    /// Read a little-endian `u64`.
    fn read_u64(&self, address: Address) -> Option<u64> {
        self.read_bytes(address, 8)
            .map(bytemuck::pod_read_unaligned::<u64>)
            .map(u64::from_le)
    }

    /// Read a pointer-sized value. 32-bit pointers are zero-extended.
    fn read_pointer(&self, address: Address) -> Option<Address> {
        if self.vm().pointer_size == 4 {
            self.read_u32(address).map(u64::from)
        } else {
            self.read_u64(address)
        }
    }

    /// Read the total element count of the array object at `address`.
    ///
    /// Single-dimension arrays keep their count in the header. Arrays with a
    /// non-null bounds pointer store one length per dimension in a separate
    /// bounds block, and the count is their product.
    fn read_array_length(&self, address: Address, rank: u32) -> Option<u64> {
        let vm = *self.vm();
        let bounds_slot = address.checked_add(u64::from(vm.array_bounds_offset_in_header))?;
        let bounds = self.read_pointer(bounds_slot)?;

        if bounds == 0 {
            let size_slot = address.checked_add(u64::from(vm.array_size_offset_in_header))?;
            return self.read_u32(size_slot).map(u64::from);
        }

        let mut length = 1u64;
        let mut cursor = bounds;
        for _ in 0..rank.max(1) {
            length = length.checked_mul(u64::from(self.read_u32(cursor)?))?;
            cursor = cursor.checked_add(vm.array_bounds_stride())?;
        }
        Some(length)
    }
}

/// Reader over the managed heap segments.
#[derive(Debug, Clone, Copy)]
pub struct HeapReader<'a> {
    segments: &'a SegmentTable,
    vm: VirtualMachineInformation,
}

impl<'a> HeapReader<'a> {
    /// Create a reader over `segments`.
    #[must_use]
    pub const fn new(segments: &'a SegmentTable, vm: VirtualMachineInformation) -> Self {
        Self { segments, vm }
    }

    /// The underlying segment table.
    #[must_use]
    pub const fn segments(&self) -> &'a SegmentTable {
        self.segments
    }

    /// Check if `address` is inside a captured segment.
    #[must_use]
    pub fn is_mapped(&self, address: Address) -> bool {
        self.segments.find(address).is_some()
    }
}

impl MemoryReader for HeapReader<'_> {
    fn vm(&self) -> &VirtualMachineInformation {
        &self.vm
    }

    fn read_bytes(&self, address: Address, len: usize) -> Option<&[u8]> {
        self.segments.bytes_at(address, len)
    }
}

/// Reader over one type's static-field storage.
///
/// Addresses passed to this reader are offsets into the storage buffer.
#[derive(Debug, Clone, Copy)]
pub struct StaticReader<'a> {
    bytes: &'a [u8],
    vm: VirtualMachineInformation,
}

impl<'a> StaticReader<'a> {
    /// Create a reader over a static-storage buffer.
    #[must_use]
    pub const fn new(bytes: &'a [u8], vm: VirtualMachineInformation) -> Self {
        Self { bytes, vm }
    }

    /// Size of the storage buffer.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the storage buffer is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl MemoryReader for StaticReader<'_> {
    fn vm(&self) -> &VirtualMachineInformation {
        &self.vm
    }

    fn read_bytes(&self, address: Address, len: usize) -> Option<&[u8]> {
        let offset = usize::try_from(address).ok()?;
        self.bytes.get(offset..offset.checked_add(len)?)
    }
}
