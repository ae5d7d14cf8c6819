//! Storage module for persisting task records
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Task record and per-stage status persistence
//! - The conditional-update primitive the claim scheduler is built on

mod filter;
mod schema;
mod sqlite;
mod traits;

pub use filter::{RecordFilter, RecordUpdate, StageChange, StatusMatch};
pub use sqlite::SqliteStore;
pub use traits::{StorageError, StorageResult, TaskStore};

use crate::state::{Stage, StageStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Opens (or creates) a task store database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized store
/// * `Err(StorageError)` - Failed to open or initialize the database
pub fn open_store(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}

/// The kind of entity a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A surname to search for; only participates in discovery
    Surname,
    /// A profile found by searching a surname
    Profile,
}

impl RecordKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Surname => "surname",
            Self::Profile => "profile",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "surname" => Some(Self::Surname),
            "profile" => Some(Self::Profile),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Status of a record within one stage, plus who holds the claim
#[derive(Debug, Clone, PartialEq)]
pub struct StageSlot {
    pub status: StageStatus,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StageSlot {
    /// Creates an unclaimed slot with the given status
    pub fn new(status: StageStatus) -> Self {
        Self {
            status,
            claimed_at: None,
            claimed_by: None,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Represents one unit of work tracked through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: String,
    pub kind: RecordKind,
    pub parent_id: Option<String>,
    /// One slot per stage the record participates in
    pub stages: BTreeMap<Stage, StageSlot>,
    /// Stage-specific data accumulated as the record advances (JSON object)
    pub payload: Value,
    /// Permanent exclusion flag
    pub locked: bool,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Creates a surname record, pending discovery
    ///
    /// The identifier is the lower-cased name.
    pub fn surname(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        let mut stages = BTreeMap::new();
        stages.insert(Stage::Discovery, StageSlot::new(StageStatus::Pending));

        Self {
            id: name.clone(),
            kind: RecordKind::Surname,
            parent_id: None,
            stages,
            payload: serde_json::json!({ "name": name }),
            locked: false,
            created_at: Utc::now(),
        }
    }

    /// Creates a profile record produced by discovery
    ///
    /// Discovery is already `done` for it; enrichment and asset-fetch are pending.
    pub fn profile(id: String, parent_id: Option<String>, payload: Value, locked: bool) -> Self {
        let mut stages = BTreeMap::new();
        stages.insert(Stage::Discovery, StageSlot::new(StageStatus::Done));
        stages.insert(Stage::Enrichment, StageSlot::new(StageStatus::Pending));
        stages.insert(Stage::AssetFetch, StageSlot::new(StageStatus::Pending));

        Self {
            id,
            kind: RecordKind::Profile,
            parent_id,
            stages,
            payload,
            locked,
            created_at: Utc::now(),
        }
    }

    /// Returns the status for a stage, or None if the record does not take part in it
    pub fn status(&self, stage: Stage) -> Option<StageStatus> {
        self.stages.get(&stage).map(|slot| slot.status)
    }

    /// Returns the slot for a stage, if the record takes part in it
    pub fn slot(&self, stage: Stage) -> Option<&StageSlot> {
        self.stages.get(&stage)
    }
}
