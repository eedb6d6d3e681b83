//! The crawler and its supporting types.

mod config;
mod crawler;
mod diagnostics;
mod progress;
mod worklist;

pub use config::{
    CrawlerConfig, DEFAULT_ABORT_CHECK_INTERVAL, DEFAULT_CACHED_POINTER_FIELD,
    DEFAULT_MAX_ARRAY_LENGTH, DEFAULT_MAX_INHERITANCE_DEPTH, DEFAULT_MAX_VALUE_TYPE_NESTING,
};
pub use crawler::{crawl, CrawlOutcome, CrawlSummary};
pub use diagnostics::{CrawlDiagnostics, Diagnostic, DiagnosticKind, Severity};
pub use progress::CrawlProgress;
