//! Configuration module for Registry-Harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use registry_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvester.toml")).unwrap();
//! println!("Harvesting region {}", config.harvest.region);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    BackoffBand, BackoffConfig, BrowserConfig, CanonicalRule, CheckpointBackend, Config,
    DriverKind, ExtractionConfig, HarvestConfig, MergeConfig, OutputConfig, PacingConfig,
    RecoveryConfig, SiteConfig, TimeoutConfig,
};

pub use parser::{
    compute_config_hash, hash_content, load_config, load_config_with_hash, parse_config,
};
pub use validation::{validate, validate_region};
