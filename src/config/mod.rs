//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The resulting [`Config`] is passed explicitly into every component; nothing
//! reads configuration from global state.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Fetching {} URLs per batch", config.pipeline.workers_count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ControllerConfig, OutputConfig, PartitionConfig, PipelineConfig, ProxyConfig,
    RotationMode, SiteConfig, TorConfig,
};
pub use validation::validate_harvest_config;

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
