// Half-open offset ranges.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::direction::Direction;

/// Position in the offset space annotations are laid out over.
pub type Offset = usize;

/// A half-open interval `[start, end)` of offsets.
///
/// Ranges are ordered by start ascending and then by end *descending*, so
/// an enclosing range sorts before the ranges it encloses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Offset,
    pub end: Offset,
}

impl Range {
    /// Create a range. Panics if `end < start`.
    pub fn new(start: Offset, end: Offset) -> Self {
        assert!(start <= end, "invalid range: {start}..{end}");
        Self { start, end }
    }

    /// A one-offset range `[offset, offset + 1)`.
    pub fn unit(offset: Offset) -> Self {
        Self::new(offset, offset + 1)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The offset a traversal in `dir` enters this range at.
    #[inline]
    pub fn start_in(&self, dir: Direction) -> Offset {
        match dir {
            Direction::LeftToRight => self.start,
            Direction::RightToLeft => self.end,
        }
    }

    /// The offset a traversal in `dir` leaves this range at.
    #[inline]
    pub fn end_in(&self, dir: Direction) -> Offset {
        match dir {
            Direction::LeftToRight => self.end,
            Direction::RightToLeft => self.start,
        }
    }

    /// Whether the two ranges share at least one offset.
    ///
    /// Touching ranges (`[0, 1)` and `[1, 2)`) do not overlap, and an empty
    /// range overlaps nothing.
    pub fn overlaps(&self, other: &Range) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && self.end > other.start
    }

    pub fn contains(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_offset(&self, offset: Offset) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Compare in the traversal order for `dir`.
    pub fn cmp_in(&self, other: &Range, dir: Direction) -> Ordering {
        let res = self.cmp(other);
        match dir {
            Direction::LeftToRight => res,
            Direction::RightToLeft => res.reverse(),
        }
    }
}

impl Ord for Range {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| other.end.cmp(&self.end))
    }
}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
