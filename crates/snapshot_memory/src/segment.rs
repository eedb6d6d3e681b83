//! Sorted memory segments of a captured heap.

use crate::Address;

/// Errors raised while assembling a [`SegmentTable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentError {
    /// Two segments claim the same bytes.
    #[error("segment at 0x{second:X} overlaps segment at 0x{first:X}")]
    Overlapping {
        /// Start of the lower segment.
        first: Address,
        /// Start of the segment that overlaps it.
        second: Address,
    },

    /// A segment runs past the end of the address space.
    #[error("segment at 0x{start:X} with {len} bytes wraps the address space")]
    AddressOverflow {
        /// Start of the offending segment.
        start: Address,
        /// Its length in bytes.
        len: usize,
    },
}

/// A contiguous range of captured memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySegment {
    /// Address of the first byte.
    pub start: Address,
    /// Captured contents.
    pub bytes: Vec<u8>,
}

impl MemorySegment {
    /// Create a segment starting at `start`.
    #[must_use]
    pub const fn new(start: Address, bytes: Vec<u8>) -> Self {
        Self { start, bytes }
    }

    /// One past the last address of this segment.
    #[inline]
    #[must_use]
    pub fn end(&self) -> Address {
        self.start.saturating_add(self.bytes.len() as u64)
    }

    /// Check if `address` falls inside this segment.
    #[inline]
    #[must_use]
    pub fn contains(&self, address: Address) -> bool {
        address >= self.start && address < self.end()
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if this segment holds no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Memory segments sorted by start address.
///
/// Lookups are the crawler's hottest operation (one per field of every
/// reachable object), so they are a binary search over the sorted starts.
///
/// # Invariants
///
/// - Segments are sorted by `start`.
/// - No two segments overlap.
/// - No segment is empty.
#[derive(Debug, Clone, Default)]
pub struct SegmentTable {
    segments: Vec<MemorySegment>,
}

impl SegmentTable {
    /// Build a table from segments in any order.
    ///
    /// Empty segments are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError`] if two segments overlap or a segment wraps
    /// the address space.
    pub fn new(mut segments: Vec<MemorySegment>) -> Result<Self, SegmentError> {
        segments.retain(|s| !s.is_empty());
        segments.sort_by_key(|s| s.start);

        for segment in &segments {
            if segment.start.checked_add(segment.len() as u64).is_none() {
                return Err(SegmentError::AddressOverflow {
                    start: segment.start,
                    len: segment.len(),
                });
            }
        }

        for pair in segments.windows(2) {
            if pair[1].start < pair[0].end() {
                return Err(SegmentError::Overlapping {
                    first: pair[0].start,
                    second: pair[1].start,
                });
            }
        }

        Ok(Self { segments })
    }

    /// Resolve `address` to its segment and the offset inside it.
    #[must_use]
    pub fn find(&self, address: Address) -> Option<(&MemorySegment, usize)> {
        let idx = self.segments.partition_point(|s| s.start <= address);
        let segment = self.segments.get(idx.checked_sub(1)?)?;
        if !segment.contains(address) {
            return None;
        }
        let offset = usize::try_from(address - segment.start).ok()?;
        Some((segment, offset))
    }

    /// Borrow `len` bytes at `address`.
    ///
    /// Fails if the range is not fully inside one segment.
    #[must_use]
    pub fn bytes_at(&self, address: Address, len: usize) -> Option<&[u8]> {
        let (segment, offset) = self.find(address)?;
        segment.bytes.get(offset..offset.checked_add(len)?)
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if the table holds no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate over segments in address order.
    pub fn iter(&self) -> impl Iterator<Item = &MemorySegment> + '_ {
        self.segments.iter()
    }

    /// Total number of captured bytes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.segments.iter().map(MemorySegment::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SegmentTable {
        SegmentTable::new(vec![
            MemorySegment::new(0x3000, vec![3; 0x100]),
            MemorySegment::new(0x1000, vec![1; 0x100]),
            MemorySegment::new(0x2000, vec![2; 0x100]),
        ])
        .unwrap()
    }

    #[test]
    fn test_segments_are_sorted() {
        let starts: Vec<_> = table().iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn test_find_inside_and_outside() {
        let table = table();

        let (segment, offset) = table.find(0x2010).unwrap();
        assert_eq!(segment.start, 0x2000);
        assert_eq!(offset, 0x10);

        assert!(table.find(0x0fff).is_none());
        assert!(table.find(0x1100).is_none());
        assert!(table.find(0x30ff).is_some());
        assert!(table.find(0x3100).is_none());
    }

    #[test]
    fn test_bytes_at_does_not_cross_segments() {
        let table = table();
        assert_eq!(table.bytes_at(0x10fc, 4), Some(&[1u8, 1, 1, 1][..]));
        assert!(table.bytes_at(0x10fd, 4).is_none());
    }

    #[test]
    fn test_overlap_rejected() {
        let err = SegmentTable::new(vec![
            MemorySegment::new(0x1000, vec![0; 0x20]),
            MemorySegment::new(0x1010, vec![0; 0x20]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            SegmentError::Overlapping {
                first: 0x1000,
                second: 0x1010
            }
        );
    }

    #[test]
    fn test_adjacent_segments_allowed() {
        let table = SegmentTable::new(vec![
            MemorySegment::new(0x1000, vec![0; 0x10]),
            MemorySegment::new(0x1010, vec![0; 0x10]),
        ])
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.total_bytes(), 0x20);
    }

    #[test]
    fn test_empty_segments_dropped() {
        let table = SegmentTable::new(vec![
            MemorySegment::new(0x1000, Vec::new()),
            MemorySegment::new(0x1000, vec![0; 8]),
        ])
        .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_wrapping_segment_rejected() {
        let err = SegmentTable::new(vec![MemorySegment::new(u64::MAX - 2, vec![0; 8])]).unwrap_err();
        assert!(matches!(err, SegmentError::AddressOverflow { .. }));
    }
}
