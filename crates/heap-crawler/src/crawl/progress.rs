//! Progress reporting and cooperative abort.
//!
//! A [`CrawlProgress`] is shared between the host and the crawling thread,
//! typically behind an `Arc`. The crawler publishes its item count and
//! checks the abort flag once per batch; the host may read and request abort
//! at any time.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::utils::CachePadded;
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;

/// Number of status messages kept for the host.
const STATUS_HISTORY: usize = 32;

/// Shared progress state of one crawl.
#[derive(Debug)]
pub struct CrawlProgress {
    items_processed: CachePadded<AtomicUsize>,
    abort_requested: CachePadded<AtomicBool>,
    status: Mutex<String>,
    history: ArrayQueue<String>,
}

impl Default for CrawlProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlProgress {
    /// Fresh progress with nothing processed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items_processed: CachePadded::new(AtomicUsize::new(0)),
            abort_requested: CachePadded::new(AtomicBool::new(false)),
            status: Mutex::new(String::new()),
            history: ArrayQueue::new(STATUS_HISTORY),
        }
    }

    /// Ask the crawler to stop at its next check.
    pub fn request_abort(&self) {
        self.abort_requested.store(true, Ordering::Release);
    }

    /// Check if an abort has been requested.
    #[inline]
    #[must_use]
    pub fn is_abort_requested(&self) -> bool {
        self.abort_requested.load(Ordering::Acquire)
    }

    /// Items processed so far, as of the last publication.
    #[inline]
    #[must_use]
    pub fn items_processed(&self) -> usize {
        self.items_processed.load(Ordering::Acquire)
    }

    /// Latest status message.
    #[must_use]
    pub fn status(&self) -> String {
        self.status.lock().clone()
    }

    /// Take every status message recorded since the last call, oldest first.
    pub fn drain_messages(&self) -> Vec<String> {
        std::iter::from_fn(|| self.history.pop()).collect()
    }

    pub(crate) fn reset(&self) {
        self.items_processed.store(0, Ordering::Release);
        while self.history.pop().is_some() {}
        self.status.lock().clear();
    }

    pub(crate) fn publish(&self, items: usize) {
        self.items_processed.store(items, Ordering::Release);
    }

    pub(crate) fn set_status(&self, message: impl Into<String>) {
        let message = message.into();
        // Oldest message is dropped when full.
        let _ = self.history.force_push(message.clone());
        *self.status.lock() = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_flag() {
        let progress = CrawlProgress::new();
        assert!(!progress.is_abort_requested());
        progress.request_abort();
        assert!(progress.is_abort_requested());
    }

    #[test]
    fn test_status_history_is_bounded() {
        let progress = CrawlProgress::new();
        for i in 0..STATUS_HISTORY + 5 {
            progress.set_status(format!("step {i}"));
        }
        assert_eq!(progress.status(), format!("step {}", STATUS_HISTORY + 4));

        let messages = progress.drain_messages();
        assert_eq!(messages.len(), STATUS_HISTORY);
        assert_eq!(messages[0], "step 5");
        assert!(progress.drain_messages().is_empty());
    }

    #[test]
    fn test_reset_keeps_abort() {
        let progress = CrawlProgress::new();
        progress.publish(10);
        progress.set_status("x");
        progress.request_abort();
        progress.reset();
        assert_eq!(progress.items_processed(), 0);
        assert!(progress.status().is_empty());
        assert!(progress.is_abort_requested());
    }
}
