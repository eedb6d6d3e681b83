//! The crawler's explicit work-list.
//!
//! Nesting depth of the heap never turns into native stack depth: every
//! pending object is a value on this stack.

use crate::registry::ManagedObjectRecord;

/// One pending object.
///
/// `record` is a transient copy. The registry owns the real record; the copy
/// only carries what is needed to walk one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    /// What to walk.
    pub record: ManagedObjectRecord,
    /// Value-type hops from the owning heap object or static slot.
    pub nesting: usize,
}

impl WorkItem {
    /// A heap object or static slot, walked from its own start.
    #[must_use]
    pub const fn root(record: ManagedObjectRecord) -> Self {
        Self { record, nesting: 0 }
    }

    /// In-line value-type data one level below `self`.
    #[must_use]
    pub const fn nested(&self, record: ManagedObjectRecord) -> Self {
        Self {
            record,
            nesting: self.nesting + 1,
        }
    }
}

/// LIFO stack of pending objects.
#[derive(Debug, Default)]
pub struct CrawlStack {
    items: Vec<WorkItem>,
    high_water_mark: usize,
}

impl CrawlStack {
    /// Create an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            high_water_mark: 0,
        }
    }

    /// Push a pending object.
    #[inline]
    pub fn push(&mut self, item: WorkItem) {
        self.items.push(item);
        self.high_water_mark = self.high_water_mark.max(self.items.len());
    }

    /// Pop the most recently pushed object.
    #[inline]
    pub fn pop(&mut self) -> Option<WorkItem> {
        self.items.pop()
    }

    /// Largest number of objects pending at once.
    #[must_use]
    pub const fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Drop every pending object.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
