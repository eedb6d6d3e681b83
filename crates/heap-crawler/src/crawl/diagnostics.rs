//! Recoverable crawl conditions.
//!
//! A diagnostic never stops a crawl. The offending handle, field, element or
//! size is left out and the walk carries on; the graph ends up a
//! conservative under-approximation.

use rustc_hash::FxHashMap;
use snapshot_memory::Address;
use thiserror::Error;

use crate::types::TypeIndex;

/// Number of diagnostics kept verbatim for the host.
const SAMPLE_LIMIT: usize = 64;

/// How bad a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Expected in real snapshots; the item is skipped.
    Warning,
    /// Data looks corrupt; the item is skipped.
    Error,
}

/// A recoverable condition met while crawling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// A GC handle has no target.
    #[error("GC handle {handle} has a null target")]
    NullGcHandle {
        /// Handle index.
        handle: usize,
    },

    /// A GC handle target has no recognisable runtime type.
    #[error("GC handle {handle} targets {address:#x}, which has no known type")]
    UnresolvedGcHandle {
        /// Handle index.
        handle: usize,
        /// Target address.
        address: Address,
    },

    /// A referenced address has no recognisable runtime type.
    #[error("no known type at {address:#x}")]
    UnresolvedAddress {
        /// Referenced address.
        address: Address,
    },

    /// A type index does not name a managed type.
    #[error("type index {type_index} is out of range")]
    InvalidTypeIndex {
        /// The bad index.
        type_index: TypeIndex,
    },

    /// A reference slot could not be read.
    #[error("cannot read pointer at {address:#x}")]
    UnreadablePointer {
        /// Slot address, or static storage offset.
        address: Address,
    },

    /// An array header could not be read.
    #[error("cannot read length of array at {address:#x}")]
    UnreadableArrayLength {
        /// Array address.
        address: Address,
    },

    /// An array length is beyond the sanity bound.
    #[error("array at {address:#x} claims {length} elements (limit {limit})")]
    CorruptArrayLength {
        /// Array address.
        address: Address,
        /// Length read from the header.
        length: u64,
        /// Configured bound.
        limit: u64,
    },

    /// An array's elements are not all captured.
    #[error("array at {address:#x} with {length} elements runs past captured memory")]
    TruncatedArray {
        /// Array address.
        address: Address,
        /// Length read from the header.
        length: u64,
    },

    /// An array of value types whose element type claims zero size.
    #[error("array at {address:#x} has zero-sized elements of type {element_type}")]
    ZeroSizedElement {
        /// Array address.
        address: Address,
        /// Element type.
        element_type: TypeIndex,
    },

    /// An object's size could not be computed.
    #[error("cannot compute size of object at {address:#x} (type {type_index})")]
    UnreadableSize {
        /// Object address.
        address: Address,
        /// Runtime type.
        type_index: TypeIndex,
    },

    /// An inheritance chain did not end within the depth bound.
    #[error("inheritance chain of type {type_index} exceeds {limit} steps")]
    InheritanceLoop {
        /// Type the walk started from.
        type_index: TypeIndex,
        /// Configured bound.
        limit: usize,
    },

    /// Value types nest deeper than the bound.
    #[error("value type {type_index} nested more than {limit} levels deep")]
    ValueTypeNestingTooDeep {
        /// Innermost value type.
        type_index: TypeIndex,
        /// Configured bound.
        limit: usize,
    },

    /// A cached native pointer names no known native object.
    #[error("object at {address:#x} caches native pointer {native_address:#x}, which is not a native object")]
    MissingNativeObject {
        /// Managed object address.
        address: Address,
        /// Cached native address.
        native_address: Address,
    },

    /// The resolver returned a native object index out of range.
    #[error("native object index {index} is out of range")]
    InvalidNativeObjectIndex {
        /// The bad index.
        index: usize,
    },
}

/// Variant of a [`Diagnostic`], without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// See [`Diagnostic::NullGcHandle`].
    NullGcHandle,
    /// See [`Diagnostic::UnresolvedGcHandle`].
    UnresolvedGcHandle,
    /// See [`Diagnostic::UnresolvedAddress`].
    UnresolvedAddress,
    /// See [`Diagnostic::InvalidTypeIndex`].
    InvalidTypeIndex,
    /// See [`Diagnostic::UnreadablePointer`].
    UnreadablePointer,
    /// See [`Diagnostic::UnreadableArrayLength`].
    UnreadableArrayLength,
    /// See [`Diagnostic::CorruptArrayLength`].
    CorruptArrayLength,
    /// See [`Diagnostic::TruncatedArray`].
    TruncatedArray,
    /// See [`Diagnostic::ZeroSizedElement`].
    ZeroSizedElement,
    /// See [`Diagnostic::UnreadableSize`].
    UnreadableSize,
    /// See [`Diagnostic::InheritanceLoop`].
    InheritanceLoop,
    /// See [`Diagnostic::ValueTypeNestingTooDeep`].
    ValueTypeNestingTooDeep,
    /// See [`Diagnostic::MissingNativeObject`].
    MissingNativeObject,
    /// See [`Diagnostic::InvalidNativeObjectIndex`].
    InvalidNativeObjectIndex,
}

impl Diagnostic {
    /// The variant, for counting.
    #[must_use]
    pub const fn kind(&self) -> DiagnosticKind {
        match self {
            Self::NullGcHandle { .. } => DiagnosticKind::NullGcHandle,
            Self::UnresolvedGcHandle { .. } => DiagnosticKind::UnresolvedGcHandle,
            Self::UnresolvedAddress { .. } => DiagnosticKind::UnresolvedAddress,
            Self::InvalidTypeIndex { .. } => DiagnosticKind::InvalidTypeIndex,
            Self::UnreadablePointer { .. } => DiagnosticKind::UnreadablePointer,
            Self::UnreadableArrayLength { .. } => DiagnosticKind::UnreadableArrayLength,
            Self::CorruptArrayLength { .. } => DiagnosticKind::CorruptArrayLength,
            Self::TruncatedArray { .. } => DiagnosticKind::TruncatedArray,
            Self::ZeroSizedElement { .. } => DiagnosticKind::ZeroSizedElement,
            Self::UnreadableSize { .. } => DiagnosticKind::UnreadableSize,
            Self::InheritanceLoop { .. } => DiagnosticKind::InheritanceLoop,
            Self::ValueTypeNestingTooDeep { .. } => DiagnosticKind::ValueTypeNestingTooDeep,
            Self::MissingNativeObject { .. } => DiagnosticKind::MissingNativeObject,
            Self::InvalidNativeObjectIndex { .. } => DiagnosticKind::InvalidNativeObjectIndex,
        }
    }

    /// Handle-table and address-lookup misses are routine in real
    /// snapshots; corrupt data is not.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::CorruptArrayLength { .. }
            | Self::UnreadableArrayLength { .. }
            | Self::TruncatedArray { .. }
            | Self::ZeroSizedElement { .. }
            | Self::UnreadableSize { .. }
            | Self::InvalidTypeIndex { .. }
            | Self::InvalidNativeObjectIndex { .. } => Severity::Error,
            _ => Severity::Warning,
        }
    }
}

/// Aggregated diagnostics of one crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlDiagnostics {
    warnings: usize,
    errors: usize,
    nested_structs_skipped: usize,
    by_kind: FxHashMap<DiagnosticKind, usize>,
    samples: Vec<Diagnostic>,
}

impl CrawlDiagnostics {
    /// Empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count and log one diagnostic.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        #[cfg(feature = "tracing")]
        crate::tracing::internal::log_diagnostic(&diagnostic);
        match diagnostic.severity() {
            Severity::Warning => self.warnings += 1,
            Severity::Error => self.errors += 1,
        }
        *self.by_kind.entry(diagnostic.kind()).or_default() += 1;
        if self.samples.len() < SAMPLE_LIMIT {
            self.samples.push(diagnostic);
        }
    }

    /// Count a skipped self-nested value-type field. Logged once, in
    /// aggregate, by [`finish`](Self::finish).
    pub fn note_nested_struct_skip(&mut self) {
        self.nested_structs_skipped += 1;
    }

    /// Emit the aggregate log lines.
    pub fn finish(&self) {
        #[cfg(feature = "tracing")]
        if self.nested_structs_skipped > 0 {
            crate::tracing::internal::log_nested_struct_skips(self.nested_structs_skipped);
        }
    }

    /// Number of warnings.
    #[must_use]
    pub const fn warnings(&self) -> usize {
        self.warnings
    }

    /// Number of errors.
    #[must_use]
    pub const fn errors(&self) -> usize {
        self.errors
    }

    /// Number of self-nested value-type fields skipped.
    #[must_use]
    pub const fn nested_structs_skipped(&self) -> usize {
        self.nested_structs_skipped
    }

    /// Number of diagnostics of one kind.
    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// The first diagnostics recorded, in order.
    #[must_use]
    pub fn samples(&self) -> &[Diagnostic] {
        &self.samples
    }

    /// Check if nothing went wrong.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings == 0 && self.errors == 0
    }
}
