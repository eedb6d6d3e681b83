//! Read-only views over captured managed-heap memory.
//!
//! A heap snapshot stores the managed heap as a list of memory segments,
//! each one a start address plus the raw bytes captured at that address.
//! Static fields live elsewhere: every type carries its own small byte buffer
//! holding the values of its static fields.
//!
//! This crate provides the primitives to read both:
//!
//! - [`SegmentTable`] keeps segments sorted and resolves an absolute address
//!   to its segment with a binary search.
//! - [`HeapReader`] reads pointers, lengths and raw bytes at absolute heap
//!   addresses.
//! - [`StaticReader`] reads the same values out of a single static-storage
//!   buffer, where the "address" is an offset into the buffer.
//!
//! Both readers implement [`MemoryReader`], so code walking object fields does
//! not care where the object lives.
//!
//! # Example
//!
//! ```
//! use snapshot_memory::{HeapReader, MemoryReader, MemorySegment, SegmentTable, VirtualMachineInformation};
//!
//! let vm = VirtualMachineInformation::mono_64bit();
//! let mut bytes = vec![0u8; 16];
//! bytes[8..16].copy_from_slice(&0x2000u64.to_le_bytes());
//!
//! let segments = SegmentTable::new(vec![MemorySegment::new(0x1000, bytes)]).unwrap();
//! let heap = HeapReader::new(&segments, vm);
//!
//! assert_eq!(heap.read_pointer(0x1008), Some(0x2000));
//! assert_eq!(heap.read_pointer(0x1010), None);
//! ```

mod reader;
mod segment;

pub use reader::{HeapReader, MemoryReader, StaticReader};
pub use segment::{MemorySegment, SegmentError, SegmentTable};

/// An address in the captured process. `0` means "no object".
pub type Address = u64;

/// Errors in the virtual-machine layout metadata.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// Only 32-bit and 64-bit targets are understood.
    #[error("unsupported pointer size {0} (expected 4 or 8)")]
    UnsupportedPointerSize(u32),

    /// A header cannot be smaller than the class word it starts with.
    #[error("{name} of {size} bytes is smaller than one pointer ({pointer_size} bytes)")]
    HeaderTooSmall {
        /// Which header was rejected.
        name: &'static str,
        /// Declared header size.
        size: u32,
        /// Declared pointer size.
        pointer_size: u32,
    },
}

/// Object layout facts of the virtual machine the snapshot was taken from.
///
/// All offsets are in bytes. Array offsets are relative to the start of the
/// array object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualMachineInformation {
    /// Width of a pointer: 4 or 8.
    pub pointer_size: u32,
    /// Size of the header preceding the fields of every heap object.
    pub object_header_size: u32,
    /// Size of the header preceding the elements of every array.
    pub array_header_size: u32,
    /// Offset of the bounds pointer (non-null only for multi-dimensional arrays).
    pub array_bounds_offset_in_header: u32,
    /// Offset of the 32-bit element count of single-dimension arrays.
    pub array_size_offset_in_header: u32,
    /// Allocation granularity of the managed heap.
    pub allocation_granularity: u32,
}

impl VirtualMachineInformation {
    /// Layout of a 64-bit Mono runtime.
    #[must_use]
    pub const fn mono_64bit() -> Self {
        Self {
            pointer_size: 8,
            object_header_size: 16,
            array_header_size: 32,
            array_bounds_offset_in_header: 16,
            array_size_offset_in_header: 24,
            allocation_granularity: 8,
        }
    }

    /// Layout of a 32-bit Mono runtime.
    #[must_use]
    pub const fn mono_32bit() -> Self {
        Self {
            pointer_size: 4,
            object_header_size: 8,
            array_header_size: 16,
            array_bounds_offset_in_header: 8,
            array_size_offset_in_header: 12,
            allocation_granularity: 8,
        }
    }

    /// Check that the layout is one the readers can work with.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] for pointer sizes other than 4 or 8, or for
    /// headers too small to hold a class pointer.
    pub const fn validate(&self) -> Result<(), LayoutError> {
        if self.pointer_size != 4 && self.pointer_size != 8 {
            return Err(LayoutError::UnsupportedPointerSize(self.pointer_size));
        }
        if self.object_header_size < self.pointer_size {
            return Err(LayoutError::HeaderTooSmall {
                name: "object header",
                size: self.object_header_size,
                pointer_size: self.pointer_size,
            });
        }
        if self.array_header_size < self.object_header_size {
            return Err(LayoutError::HeaderTooSmall {
                name: "array header",
                size: self.array_header_size,
                pointer_size: self.pointer_size,
            });
        }
        Ok(())
    }

    /// Byte distance between consecutive dimensions in a bounds block.
    ///
    /// Each dimension stores a length followed by a lower bound, both
    /// pointer sized.
    #[inline]
    #[must_use]
    pub const fn array_bounds_stride(&self) -> u64 {
        2 * self.pointer_size as u64
    }
}
