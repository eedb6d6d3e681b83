//! Fatal errors.
//!
//! Anything recoverable during a crawl is a [`Diagnostic`](crate::Diagnostic)
//! instead and never surfaces here.

use snapshot_memory::{LayoutError, SegmentError};
use thiserror::Error;

use crate::types::TypeIndex;

/// A snapshot failed validation while being assembled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SnapshotError {
    /// The virtual machine layout is unusable.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Heap segments are inconsistent.
    #[error(transparent)]
    Segments(#[from] SegmentError),

    /// A type names a base or element type outside the table.
    #[error("type {type_index} ({name}) refers to base or element type {base}, but only {type_count} types exist")]
    InvalidBaseType {
        /// Offending type.
        type_index: TypeIndex,
        /// Its name.
        name: String,
        /// The out-of-range index.
        base: TypeIndex,
        /// Number of managed types.
        type_count: usize,
    },

    /// The engine root object type index is outside the table.
    #[error("engine object type {0} is not a managed type")]
    InvalidEngineObjectType(TypeIndex),

    /// A native object refers to an unknown native type.
    #[error("native object {object} has native type {native_type}, but only {native_type_count} native types exist")]
    InvalidNativeType {
        /// Offending native object.
        object: usize,
        /// The out-of-range index.
        native_type: usize,
        /// Number of native types.
        native_type_count: usize,
    },
}

/// A crawl could not start.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CrawlError {
    /// The snapshot does not say which managed type is the engine root object.
    #[error("snapshot has no engine object type")]
    EngineObjectTypeMissing,

    /// The engine root object type lacks the cached native pointer field.
    #[error("type {type_name} has no instance field named {field_name}")]
    CachedPointerFieldMissing {
        /// Engine root object type.
        type_name: String,
        /// Field that was looked for.
        field_name: String,
    },
}
