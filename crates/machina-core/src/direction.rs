// Traversal direction over an ordered offset space.

use serde::{Deserialize, Serialize};

/// Direction in which an annotation sequence is read.
///
/// Right-to-left traversal is the same algorithm as left-to-right with the
/// sense of "start" and "end" swapped; see [`crate::Range::start_in`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    LeftToRight,
    RightToLeft,
}

impl Direction {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Direction::LeftToRight => Direction::RightToLeft,
            Direction::RightToLeft => Direction::LeftToRight,
        }
    }

    #[inline]
    pub fn is_left_to_right(self) -> bool {
        self == Direction::LeftToRight
    }
}
