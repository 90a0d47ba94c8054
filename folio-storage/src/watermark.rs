//! Store watermark used for coarse cache invalidation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point in the store's mutation history.
///
/// Watermarks are monotonically increasing and can be compared to determine
/// if mutations have occurred between two points in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Watermark {
    /// Monotonically increasing sequence number.
    /// Each mutation increments this value.
    pub sequence: i64,
    /// When this watermark was observed.
    pub observed_at: DateTime<Utc>,
}

impl Watermark {
    /// Create a new watermark with the given sequence number.
    pub fn new(sequence: i64) -> Self {
        Self {
            sequence,
            observed_at: Utc::now(),
        }
    }

    /// Create a zero watermark (beginning of time).
    pub fn zero() -> Self {
        Self {
            sequence: 0,
            observed_at: DateTime::UNIX_EPOCH,
        }
    }

    /// The watermark after one more mutation.
    pub fn next(&self) -> Self {
        Self::new(self.sequence + 1)
    }

    /// Check if this watermark is newer than another.
    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.sequence > other.sequence
    }

    /// Check if this watermark is at least as fresh as another.
    pub fn is_at_least(&self, other: &Watermark) -> bool {
        self.sequence >= other.sequence
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_helpers() {
        let a = Watermark::zero();
        let b = a.next();
        assert!(b.is_newer_than(&a));
        assert!(!a.is_newer_than(&b));
        assert!(b.is_at_least(&b));
        assert!(!a.is_at_least(&b));
        assert_eq!(Watermark::default().sequence, 0);
    }
}
