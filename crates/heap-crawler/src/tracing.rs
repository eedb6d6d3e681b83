//! Crawl tracing support.
//!
//! When the `tracing` feature is enabled, this module provides structured
//! spans and events for crawl phases and diagnostics.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    use crate::crawl::{Diagnostic, Severity};

    /// Crawl phases, in execution order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum CrawlPhase {
        /// Resolve GC handle targets.
        GcHandles,
        /// Seed substitute addresses.
        SubstituteRoots,
        /// Register static field slots.
        StaticFields,
        /// Drain the work-list.
        Traverse,
    }

    /// Stable identifier for a crawl.
    ///
    /// Correlates every event of one crawl. Monotonically increasing,
    /// starting at 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CrawlId(pub u64);

    static NEXT_CRAWL_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next crawl ID.
    pub fn next_crawl_id() -> CrawlId {
        CrawlId(NEXT_CRAWL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Span covering a whole crawl.
    pub fn trace_crawl(crawl_id: CrawlId) -> span::EnteredSpan {
        span!(Level::DEBUG, "heap_crawl", crawl_id = crawl_id.0).entered()
    }

    /// Span covering one phase.
    pub fn trace_phase(phase: CrawlPhase) -> span::EnteredSpan {
        span!(Level::DEBUG, "crawl_phase", phase = ?phase).entered()
    }

    /// Log the start of a phase.
    pub fn log_phase_start(phase: CrawlPhase, objects: usize) {
        tracing::debug!(phase = ?phase, objects, "phase_start");
    }

    /// Log the end of a phase.
    pub fn log_phase_end(phase: CrawlPhase, objects: usize, connections: usize) {
        tracing::debug!(phase = ?phase, objects, connections, "phase_end");
    }

    /// Log one diagnostic at its severity.
    pub fn log_diagnostic(diagnostic: &Diagnostic) {
        match diagnostic.severity() {
            Severity::Warning => tracing::warn!(kind = ?diagnostic.kind(), "{diagnostic}"),
            Severity::Error => tracing::error!(kind = ?diagnostic.kind(), "{diagnostic}"),
        }
    }

    /// Log the aggregate count of skipped self-nested value-type fields.
    pub fn log_nested_struct_skips(count: usize) {
        tracing::info!(count, "skipped self-nested value type fields");
    }

    /// Log that the host asked the crawl to stop.
    pub fn log_abort(items_processed: usize) {
        tracing::info!(items_processed, "crawl aborted");
    }
}

#[cfg(not(feature = "tracing"))]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CrawlId(pub u64);

    /// Stub function when tracing is disabled.
    pub const fn next_crawl_id() -> CrawlId {
        CrawlId(0)
    }
}

pub use internal::CrawlId;
