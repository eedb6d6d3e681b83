//! Object size rules.

use snapshot_memory::{Address, MemoryReader};

use crate::types::{TypeIndex, TypeTable};

/// Size of the length field preceding string characters.
const STRING_LENGTH_FIELD_SIZE: u64 = 4;
/// Width of one UTF-16 code unit.
const STRING_CHAR_SIZE: u64 = 2;
/// Strings keep a trailing NUL code unit.
const STRING_TERMINATOR_SIZE: u64 = 2;

/// Size computations layered on any [`MemoryReader`].
pub trait ObjectLayout: MemoryReader {
    /// Byte size of the object at `address` whose runtime type is
    /// `type_index`.
    ///
    /// - arrays: array header plus element count times element size
    ///   (pointer size for reference elements);
    /// - strings: object header, length field, characters, terminator;
    /// - anything else: the type's declared instance size.
    ///
    /// Returns `None` when a length cannot be read or the arithmetic
    /// overflows.
    fn read_object_size(
        &self,
        address: Address,
        types: &TypeTable,
        type_index: TypeIndex,
    ) -> Option<u64> {
        let ty = types.get(type_index)?;
        let vm = *self.vm();

        if ty.is_array {
            let length = self.read_array_length(address, ty.array_rank)?;
            let element = types.get(types.element_type(type_index)?)?;
            let element_size = if element.is_value_type {
                element.size
            } else {
                u64::from(vm.pointer_size)
            };
            return length
                .checked_mul(element_size)?
                .checked_add(u64::from(vm.array_header_size));
        }

        if types.is_string(type_index) {
            let length = self.read_u32(address.checked_add(u64::from(vm.object_header_size))?)?;
            return u64::from(length)
                .checked_mul(STRING_CHAR_SIZE)?
                .checked_add(
                    u64::from(vm.object_header_size)
                        + STRING_LENGTH_FIELD_SIZE
                        + STRING_TERMINATOR_SIZE,
                );
        }

        Some(ty.size)
    }
}

impl<R: MemoryReader + ?Sized> ObjectLayout for R {}
