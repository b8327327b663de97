//! Range assignment and the lazy range sequence

use crate::partition::PartitionError;
use serde::{Deserialize, Serialize};

/// Order in which ranges (and the indices inside them) are handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDirection {
    Descending,
    Ascending,
}

impl RangeDirection {
    pub fn from_descending(descending: bool) -> Self {
        if descending {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

/// A slice of the index space owned by one worker
///
/// Descending assignments have `start > end` and cover `end..start` walked
/// from the top; ascending ones have `start < end` and cover `start..end`.
/// `(0, 0)` is the empty assignment handed out after exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeAssignment {
    pub start: u64,
    pub end: u64,
}

impl RangeAssignment {
    pub const EMPTY: RangeAssignment = RangeAssignment { start: 0, end: 0 };

    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of indices covered
    pub fn len(&self) -> u64 {
        self.start.abs_diff(self.end)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn is_descending(&self) -> bool {
        self.start > self.end
    }

    /// Indices covered by this assignment, in harvesting order
    pub fn indices(&self) -> Box<dyn Iterator<Item = u64> + Send> {
        if self.is_descending() {
            Box::new((self.end..self.start).rev())
        } else {
            Box::new(self.start..self.end)
        }
    }
}

/// Lazily splits `[0, total)` into `workers` contiguous ranges
///
/// Each call to [`RangePartitioner::next_range`] hands out the next chunk of
/// `total / workers` indices, walking down from `total`. The final chunk is
/// clamped to 0 and absorbs the division remainder. Once exhausted, every
/// further call returns [`RangeAssignment::EMPTY`].
#[derive(Debug, Clone)]
pub struct RangePartitioner {
    total: u64,
    workers: u64,
    step: u64,
    direction: RangeDirection,
    cursor: u64,
    issued: u64,
}

impl RangePartitioner {
    /// Creates a partitioner
    ///
    /// # Arguments
    ///
    /// * `total` - Size of the index space
    /// * `workers` - Number of cooperating workers, `1..=total`
    /// * `direction` - Orientation of the handed out ranges
    pub fn new(total: u64, workers: u64, direction: RangeDirection) -> Result<Self, PartitionError> {
        if workers == 0 {
            return Err(PartitionError::NoWorkers);
        }
        if workers > total {
            return Err(PartitionError::TooManyWorkers { workers, total });
        }

        Ok(Self {
            total,
            workers,
            step: total / workers,
            direction,
            cursor: total,
            issued: 0,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn workers(&self) -> u64 {
        self.workers
    }

    /// Returns the next range, or the empty range once all are handed out
    pub fn next_range(&mut self) -> RangeAssignment {
        self.advance().unwrap_or(RangeAssignment::EMPTY)
    }

    /// Evaluates the sequence on behalf of a 1-based worker identity
    pub fn assignment_for(&self, worker_id: u64) -> Result<RangeAssignment, PartitionError> {
        if worker_id == 0 || worker_id > self.workers {
            return Err(PartitionError::InvalidWorkerId {
                id: worker_id,
                workers: self.workers,
            });
        }

        let mut fresh = Self::new(self.total, self.workers, self.direction)?;
        Ok(fresh
            .nth((worker_id - 1) as usize)
            .unwrap_or(RangeAssignment::EMPTY))
    }

    fn advance(&mut self) -> Option<RangeAssignment> {
        if self.cursor == 0 {
            return None;
        }

        let start = self.cursor;
        self.issued += 1;

        let mut end = start.saturating_sub(self.step);
        if end < self.step || self.issued == self.workers {
            end = 0;
        }
        self.cursor = end;

        Some(match self.direction {
            RangeDirection::Descending => RangeAssignment::new(start, end),
            RangeDirection::Ascending => RangeAssignment::new(end, start),
        })
    }
}

impl Iterator for RangePartitioner {
    type Item = RangeAssignment;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}
