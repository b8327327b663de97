//! Work partitioning across cooperating workers
//!
//! The index space `[0, total)` is split into contiguous ranges, one per
//! worker identity. Ranges come out high-to-low by default so the most recent
//! listing pages are harvested first.

mod range;
mod source;

pub use range::{RangeAssignment, RangeDirection, RangePartitioner};
pub use source::RangeSource;

use thiserror::Error;

/// Errors raised while building or querying a partition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("At least one worker is required")]
    NoWorkers,

    #[error("{workers} workers cannot share {total} units")]
    TooManyWorkers { workers: u64, total: u64 },

    #[error("Worker id {id} is outside 1..={workers}")]
    InvalidWorkerId { id: u64, workers: u64 },
}
