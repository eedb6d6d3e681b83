//! Crawl metrics and statistics.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Statistics from one crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlMetrics {
    /// Wall time of the whole crawl.
    pub duration: Duration,
    /// Time spent on GC handles and substitute roots.
    pub roots_duration: Duration,
    /// Time spent registering static fields.
    pub statics_duration: Duration,
    /// Time spent draining the work-list.
    pub traverse_duration: Duration,
    /// Work items processed, roots included.
    pub items_processed: usize,
    /// Heap objects discovered.
    pub objects: usize,
    /// Static field slots registered.
    pub static_fields: usize,
    /// Connections recorded.
    pub connections: usize,
    /// Deepest the work-list got.
    pub max_stack_depth: usize,
    /// Arrays whose elements could hold no references and were not expanded.
    pub arrays_skipped: usize,
    /// Whether the host stopped the crawl early.
    pub aborted: bool,
}

impl Default for CrawlMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlMetrics {
    /// Create a new `CrawlMetrics` with all fields zeroed.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            duration: Duration::ZERO,
            roots_duration: Duration::ZERO,
            statics_duration: Duration::ZERO,
            traverse_duration: Duration::ZERO,
            items_processed: 0,
            objects: 0,
            static_fields: 0,
            connections: 0,
            max_stack_depth: 0,
            arrays_skipped: 0,
            aborted: false,
        }
    }
}

/// Captures phase durations of a crawl.
///
/// # Example
///
/// ```
/// use heap_crawler::metrics::PhaseTimer;
///
/// let mut timer = PhaseTimer::new();
/// timer.start();
/// // ... root phase work ...
/// timer.end_roots();
///
/// timer.start();
/// // ... traversal ...
/// timer.end_traverse();
/// assert!(timer.total() >= timer.traverse);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimer {
    /// Root phase time.
    pub roots: Duration,
    /// Static field phase time.
    pub statics: Duration,
    /// Traversal time.
    pub traverse: Duration,
    current_start: Option<Instant>,
}

impl Default for PhaseTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTimer {
    /// Create a new `PhaseTimer` with all durations set to zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            roots: Duration::ZERO,
            statics: Duration::ZERO,
            traverse: Duration::ZERO,
            current_start: None,
        }
    }

    /// Start timing a phase.
    pub fn start(&mut self) {
        self.current_start = Some(Instant::now());
    }

    /// End the root phase and record its duration.
    pub fn end_roots(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.roots = start.elapsed();
        }
    }

    /// End the static field phase and record its duration.
    pub fn end_statics(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.statics = start.elapsed();
        }
    }

    /// End the traversal and record its duration.
    pub fn end_traverse(&mut self) {
        if let Some(start) = self.current_start.take() {
            self.traverse = start.elapsed();
        }
    }

    /// Sum of the recorded phases.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.roots + self.statics + self.traverse
    }
}

thread_local! {
    static LAST_METRICS: Cell<CrawlMetrics> = const { Cell::new(CrawlMetrics::new()) };
}

/// Metrics of the last crawl run on this thread.
#[must_use]
pub fn last_crawl_metrics() -> CrawlMetrics {
    LAST_METRICS.with(Cell::get)
}

/// Record metrics for a crawl.
pub(crate) fn record_metrics(metrics: CrawlMetrics) {
    LAST_METRICS.with(|m| m.set(metrics));
}
