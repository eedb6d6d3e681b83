//! Object graph reconstruction from managed heap snapshots.
//!
//! `heap-crawler` takes a captured managed heap (raw memory segments, type
//! metadata, GC handles, native objects and static field storage) and builds
//! the graph of which object keeps which alive. The graph answers the usual
//! memory-profiler questions: what holds this object, what does it hold, and
//! how much memory hangs off it.
//!
//! # Features
//!
//! - **Explicit work-list**: long reference chains never touch the native stack
//! - **Stable identities**: one record per heap address, value types share
//!   their parent's identity
//! - **Graceful degradation**: corrupt data is skipped and reported, the crawl
//!   carries on
//! - **Cooperative abort**: progress can be polled and the crawl stopped from
//!   another thread
//!
//! # Quick Start
//!
//! ```
//! use heap_crawler::{
//!     ConnectionKind, CrawlProgress, CrawlerConfig, FieldDescription, SnapshotBuilder,
//!     TypeDescription,
//! };
//! use snapshot_memory::VirtualMachineInformation;
//!
//! let mut builder = SnapshotBuilder::new(VirtualMachineInformation::mono_64bit());
//! let object = builder.add_type(TypeDescription::class("System.Object", 16));
//! let pointer = builder.add_type(TypeDescription::value_type("System.IntPtr", 8));
//! let engine = builder.add_type(
//!     TypeDescription::class("UnityEngine.Object", 24)
//!         .with_base(object)
//!         .with_field(FieldDescription::instance("m_CachedPtr", 16, pointer))
//!         .with_type_info_address(0xA000),
//! );
//! builder.engine_object_type(engine);
//!
//! // One engine object at 0x1000, pinned by a GC handle.
//! let mut memory = vec![0u8; 24];
//! memory[..8].copy_from_slice(&0xA000u64.to_le_bytes());
//! builder.add_segment(0x1000, memory);
//! builder.add_gc_handle(0x1000);
//!
//! let mut snapshot = builder.build().unwrap();
//! let summary = snapshot
//!     .crawl(&[], &CrawlerConfig::default(), &CrawlProgress::new())
//!     .unwrap();
//!
//! assert!(summary.is_complete());
//! assert_eq!(snapshot.graph.objects.len(), 1);
//! assert_eq!(
//!     snapshot
//!         .graph
//!         .connections
//!         .count_between(ConnectionKind::GcHandle, ConnectionKind::Managed),
//!     1
//! );
//! ```
//!
//! # Threading
//!
//! A crawl runs on one thread and owns the snapshot mutably while it runs.
//! The only shared state is [`CrawlProgress`], which a host may poll and use
//! to request abort from any thread.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod connection;
mod crawl;
mod error;
mod graph;
mod layout;
pub mod metrics;
mod registry;
mod resolver;
mod snapshot;
mod tracing;
mod types;

pub use connection::{Connection, ConnectionGraph, ConnectionIndex, ConnectionKind, Endpoint};
pub use crawl::{
    crawl, CrawlDiagnostics, CrawlOutcome, CrawlProgress, CrawlSummary, CrawlerConfig,
    Diagnostic, DiagnosticKind, Severity, DEFAULT_ABORT_CHECK_INTERVAL,
    DEFAULT_CACHED_POINTER_FIELD, DEFAULT_MAX_ARRAY_LENGTH, DEFAULT_MAX_INHERITANCE_DEPTH,
    DEFAULT_MAX_VALUE_TYPE_NESTING,
};
pub use error::{CrawlError, SnapshotError};
pub use graph::ObjectGraph;
pub use layout::ObjectLayout;
pub use metrics::{last_crawl_metrics, CrawlMetrics, PhaseTimer};
pub use registry::{
    ManagedObjectRecord, ObjectIdentity, ObjectRegistry, StaticFieldRecord, StaticStorage,
};
pub use resolver::{AddressResolver, SnapshotResolver};
pub use snapshot::{GcHandleRecord, NativeObjectRecord, Snapshot, SnapshotBuilder};
pub use tracing::CrawlId;
pub use types::{
    FieldDescription, NativeTypeDescription, TypeDescription, TypeIndex, TypeTable,
};
