//! Configuration module for gallery-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use gallery_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Running {} workers", config.pipeline.workers);
//! ```

mod parser;
mod types;
pub mod validation;

// Re-export types
pub use types::{
    Config, OutputConfig, PipelineConfig, PolitenessConfig, SeedConfig, SiteConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
