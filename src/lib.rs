//! Sumi-Harvest: a distributed, rotation-aware web harvester
//!
//! This crate turns an enumerable space of listing pages into stored records.
//! Pages are fetched through an anonymizing proxy whose exit address is rotated
//! after every batch, and several cooperating workers can split the same target
//! into disjoint index ranges.

pub mod config;
pub mod controller;
pub mod fetch;
pub mod partition;
pub mod pipeline;
pub mod rotation;
pub mod site;
pub mod storage;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("IP rotation error: {0}")]
    Rotation(#[from] rotation::RotationError),

    #[error("Partition error: {0}")]
    Partition(#[from] partition::PartitionError),

    #[error("Site error: {0}")]
    Site(#[from] site::SiteError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Controller error: {0}")]
    Controller(String),

    #[error("Pipeline worker failed: {0}")]
    Worker(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use fetch::FetchResult;
pub use partition::{RangeAssignment, RangePartitioner};
pub use pipeline::{Harvester, Pipeline};
pub use storage::Record;
