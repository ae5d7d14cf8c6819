//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the task store.
//! The schema version is kept in SQLite's `user_version` header field.

use crate::storage::traits::{StorageError, StorageResult};
use rusqlite::Connection;

/// Version stamped on databases created by this build
pub const SCHEMA_VERSION: i64 = 1;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per discovered entity
CREATE TABLE IF NOT EXISTS records (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    parent_id TEXT,
    payload TEXT NOT NULL DEFAULT '{}',
    locked INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);
CREATE INDEX IF NOT EXISTS idx_records_parent ON records(parent_id);

-- One row per (record, stage) the record participates in
CREATE TABLE IF NOT EXISTS stage_status (
    record_id TEXT NOT NULL REFERENCES records(id),
    stage TEXT NOT NULL,
    status TEXT NOT NULL,
    claimed_at TEXT,
    claimed_by TEXT,
    error TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (record_id, stage)
);

CREATE INDEX IF NOT EXISTS idx_stage_status_lookup ON stage_status(stage, status);
"#;

/// Reads the schema version stored in the database header
///
/// A database no build has touched yet reports 0.
pub fn get_schema_version(conn: &Connection) -> StorageResult<i64> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized (or already present) at `SCHEMA_VERSION`
/// * `Err(StorageError::SchemaVersion)` - The file was written by another schema version
/// * `Err(StorageError::Sqlite)` - Failed to initialize schema
pub fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    let found = get_schema_version(conn)?;
    if found != 0 && found != SCHEMA_VERSION {
        return Err(StorageError::SchemaVersion {
            found,
            expected: SCHEMA_VERSION,
        });
    }

    conn.execute_batch(SCHEMA_SQL)?;
    if found == 0 {
        conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
    }
    Ok(())
}
