//! gallery-harvest: a multi-worker, multi-stage gallery crawler
//!
//! Records move through a fixed pipeline (discovery, enrichment, asset-fetch).
//! Workers coordinate only through the task store: each claim is a
//! conditional update, so a record is handled by exactly one worker per stage.

pub mod config;
pub mod crawler;
pub mod output;
pub mod seed;
pub mod site;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for gallery-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crawler::PipelineError),

    #[error("Failed to read name list {path}: {message}")]
    SeedList { path: String, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for gallery-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{Stage, StageStatus};
pub use storage::{SqliteStore, TaskRecord, TaskStore};
