//! Storage traits and error types
//!
//! This module defines the trait interface for task store backends and
//! associated error types.

use crate::state::{Stage, StageStatus};
use crate::storage::{RecordFilter, RecordUpdate, TaskRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid transition for {record_id} in {stage}: {from} -> {to}")]
    InvalidTransition {
        record_id: String,
        stage: Stage,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("Database has schema version {found}, this build expects {expected}")]
    SchemaVersion { found: i64, expected: i64 },

    #[error("Claim on {record_id} for {stage} is no longer held")]
    ClaimLost { record_id: String, stage: Stage },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for task store implementations
///
/// The store is the single source of truth and the only synchronization point
/// between workers. Every method must be atomic on its own; callers never hold
/// a lock across calls.
pub trait TaskStore: Send + Sync {
    /// Returns the first record matching `filter`, if any
    fn find_one(&self, filter: &RecordFilter) -> StorageResult<Option<TaskRecord>>;

    /// Applies `update` to one record still matching `filter`
    ///
    /// The match and the write happen in a single transaction, so a record
    /// that stopped matching between a caller's `find_one` and this call is
    /// left untouched.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A record matched and was updated
    /// * `Ok(false)` - No record matched; nothing changed
    /// * `Err(StorageError::InvalidTransition)` - The update would break the stage state machine
    fn atomic_update(&self, filter: &RecordFilter, update: &RecordUpdate) -> StorageResult<bool>;

    /// Inserts a new record
    ///
    /// Returns `false` without changing anything if the id already exists.
    fn insert(&self, record: &TaskRecord) -> StorageResult<bool>;

    /// Counts records matching `filter`
    fn count(&self, filter: &RecordFilter) -> StorageResult<u64>;

    /// Counts records per status for one stage
    fn status_counts(&self, stage: Stage) -> StorageResult<HashMap<StageStatus, u64>>;
}
