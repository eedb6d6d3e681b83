//! Managed and native type metadata.
//!
//! The crawler only reads this model. Field layout decides where references
//! live inside an object; the value/reference/array classification decides
//! how each field is followed.

use snapshot_memory::Address;

/// Index into the managed type table.
pub type TypeIndex = usize;

/// Upper bound on inheritance steps taken while computing type facts.
const FACT_CHAIN_LIMIT: usize = 256;

/// CLR types holding no references and no further fields worth walking.
const PRIMITIVE_TYPE_NAMES: &[&str] = &[
    "System.Boolean",
    "System.Char",
    "System.SByte",
    "System.Byte",
    "System.Int16",
    "System.UInt16",
    "System.Int32",
    "System.UInt32",
    "System.Int64",
    "System.UInt64",
    "System.Single",
    "System.Double",
    "System.IntPtr",
    "System.UIntPtr",
];

const STRING_TYPE_NAME: &str = "System.String";

/// One field declared by a managed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Field name as declared.
    pub name: String,
    /// Byte offset. Instance field offsets include the object header;
    /// static field offsets are relative to the type's static storage.
    pub offset: u64,
    /// Type of the value stored in the field.
    pub type_index: TypeIndex,
    /// Whether the field lives in static storage.
    pub is_static: bool,
}

impl FieldDescription {
    /// An instance field.
    #[must_use]
    pub fn instance(name: impl Into<String>, offset: u64, type_index: TypeIndex) -> Self {
        Self {
            name: name.into(),
            offset,
            type_index,
            is_static: false,
        }
    }

    /// A static field.
    #[must_use]
    pub fn static_field(name: impl Into<String>, offset: u64, type_index: TypeIndex) -> Self {
        Self {
            name: name.into(),
            offset,
            type_index,
            is_static: true,
        }
    }
}

/// A managed type as captured in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeDescription {
    /// Fully qualified name.
    pub name: String,
    /// Defining assembly.
    pub assembly: String,
    /// Whether instances are stored in-line (structs, enums, primitives).
    pub is_value_type: bool,
    /// Whether this is an array type.
    pub is_array: bool,
    /// Number of array dimensions; meaningful only for arrays.
    pub array_rank: u32,
    /// Element size for arrays, instance size otherwise.
    pub size: u64,
    /// Declared fields, in metadata order. Inherited fields are found by
    /// walking the base type.
    pub fields: Vec<FieldDescription>,
    /// Base class for classes, element type for arrays. A type naming itself
    /// ends the inheritance chain.
    pub base_or_element_type_index: Option<TypeIndex>,
    /// Whether the type derives from the engine's root object type.
    pub is_engine_object: bool,
    /// Captured static-field storage; empty when the type has none.
    pub static_field_bytes: Vec<u8>,
    /// Address of the runtime class structure, used to identify the type of
    /// a heap object by its class word. `0` when unknown.
    pub type_info_address: Address,
}

impl TypeDescription {
    /// A reference type with the given instance size.
    #[must_use]
    pub fn class(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Self::default()
        }
    }

    /// A value type with the given in-line size.
    #[must_use]
    pub fn value_type(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            is_value_type: true,
            size,
            ..Self::default()
        }
    }

    /// A single-dimension array of `element`, whose elements take
    /// `element_size` bytes.
    #[must_use]
    pub fn array(name: impl Into<String>, element: TypeIndex, element_size: u64) -> Self {
        Self {
            name: name.into(),
            is_array: true,
            array_rank: 1,
            size: element_size,
            base_or_element_type_index: Some(element),
            ..Self::default()
        }
    }

    /// Set the base (or element) type.
    #[must_use]
    pub const fn with_base(mut self, base: TypeIndex) -> Self {
        self.base_or_element_type_index = Some(base);
        self
    }

    /// Append a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldDescription) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the captured static storage.
    #[must_use]
    pub fn with_static_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.static_field_bytes = bytes;
        self
    }

    /// Set the runtime class address.
    #[must_use]
    pub const fn with_type_info_address(mut self, address: Address) -> Self {
        self.type_info_address = address;
        self
    }

    /// Set the number of array dimensions.
    #[must_use]
    pub const fn with_rank(mut self, rank: u32) -> Self {
        self.array_rank = rank;
        self
    }

    /// Mark the type as deriving from the engine's root object type.
    #[must_use]
    pub const fn engine_object(mut self) -> Self {
        self.is_engine_object = true;
        self
    }

    /// Instance fields declared directly on this type.
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDescription> + '_ {
        self.fields.iter().filter(|f| !f.is_static)
    }

    /// Static fields declared on this type, with their index in `fields`.
    pub fn static_fields(&self) -> impl Iterator<Item = (usize, &FieldDescription)> + '_ {
        self.fields.iter().enumerate().filter(|(_, f)| f.is_static)
    }

    /// Base type, unless the chain ends here.
    #[must_use]
    pub fn base_type(&self, own_index: TypeIndex) -> Option<TypeIndex> {
        self.base_or_element_type_index
            .filter(|&base| base != own_index && !self.is_array)
    }
}

/// A native (engine-side) type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NativeTypeDescription {
    /// Native class name.
    pub name: String,
    /// Managed type paired with this native type, filled while crawling.
    pub managed_type_index: Option<TypeIndex>,
}

impl NativeTypeDescription {
    /// A native type with no managed pairing yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            managed_type_index: None,
        }
    }
}

/// Per-type classification computed once when the table is built.
#[derive(Debug, Clone, Copy, Default)]
struct TypeFacts {
    is_primitive: bool,
    is_string: bool,
    contains_references: bool,
}

/// The managed type table with precomputed classification.
#[derive(Debug, Clone, Default)]
pub struct TypeTable {
    types: Vec<TypeDescription>,
    facts: Vec<TypeFacts>,
}

impl TypeTable {
    /// Build the table and classify every type.
    #[must_use]
    pub fn new(types: Vec<TypeDescription>) -> Self {
        let mut facts: Vec<TypeFacts> = types
            .iter()
            .map(|t| TypeFacts {
                is_primitive: t.is_value_type && PRIMITIVE_TYPE_NAMES.contains(&t.name.as_str()),
                is_string: !t.is_value_type && t.name == STRING_TYPE_NAME,
                contains_references: !t.is_value_type,
            })
            .collect();

        // Monotone fixed point: a value type holds references if any instance
        // field along its chain is a reference or a value type that does.
        // Each pass can only flip flags to true, so self-nesting terminates.
        loop {
            let mut changed = false;
            for index in 0..types.len() {
                if facts[index].contains_references {
                    continue;
                }
                if Self::chain_has_reference(&types, &facts, index) {
                    facts[index].contains_references = true;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        Self { types, facts }
    }

    fn chain_has_reference(types: &[TypeDescription], facts: &[TypeFacts], index: TypeIndex) -> bool {
        let mut current = index;
        for _ in 0..FACT_CHAIN_LIMIT {
            let ty = &types[current];
            let found = ty.instance_fields().any(|field| {
                types.get(field.type_index).is_some_and(|ft| {
                    !ft.is_value_type || facts[field.type_index].contains_references
                })
            });
            if found {
                return true;
            }
            match ty.base_type(current) {
                Some(base) if base < types.len() => current = base,
                _ => return false,
            }
        }
        false
    }

    /// Look up a type.
    #[inline]
    #[must_use]
    pub fn get(&self, index: TypeIndex) -> Option<&TypeDescription> {
        self.types.get(index)
    }

    /// Number of types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the table holds no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate over `(index, type)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (TypeIndex, &TypeDescription)> + '_ {
        self.types.iter().enumerate()
    }

    /// Check if the type is a primitive value type.
    #[inline]
    #[must_use]
    pub fn is_primitive(&self, index: TypeIndex) -> bool {
        self.facts.get(index).is_some_and(|f| f.is_primitive)
    }

    /// Check if the type is the runtime string type.
    #[inline]
    #[must_use]
    pub fn is_string(&self, index: TypeIndex) -> bool {
        self.facts.get(index).is_some_and(|f| f.is_string)
    }

    /// Check if an instance can hold a reference, directly or through
    /// nested value types. Always true for reference types.
    #[inline]
    #[must_use]
    pub fn contains_references(&self, index: TypeIndex) -> bool {
        self.facts.get(index).is_some_and(|f| f.contains_references)
    }

    /// Element type of an array type.
    #[must_use]
    pub fn element_type(&self, array: TypeIndex) -> Option<TypeIndex> {
        let ty = self.get(array)?;
        if !ty.is_array {
            return None;
        }
        ty.base_or_element_type_index
            .filter(|&element| element < self.types.len())
    }

    /// Find a non-static field by name on `index` or its base types.
    ///
    /// Returns the type declaring the field and the field itself.
    #[must_use]
    pub fn find_instance_field(
        &self,
        index: TypeIndex,
        name: &str,
    ) -> Option<(TypeIndex, &FieldDescription)> {
        let mut current = index;
        for _ in 0..FACT_CHAIN_LIMIT {
            let ty = self.get(current)?;
            if let Some(field) = ty.instance_fields().find(|f| f.name == name) {
                return Some((current, field));
            }
            current = ty.base_type(current)?;
        }
        None
    }

    /// Consume the table, returning the raw descriptions.
    #[must_use]
    pub fn into_inner(self) -> Vec<TypeDescription> {
        self.types
    }
}
