//! SQLite task store implementation
//!
//! This module provides a SQLite-based implementation of the TaskStore trait.
//! Every trait method runs inside its own transaction; writes take the
//! database write lock up front (`BEGIN IMMEDIATE`), which is what makes
//! `atomic_update` safe across connections and processes.

use crate::state::{Stage, StageStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult, TaskStore};
use crate::storage::{
    RecordFilter, RecordKind, RecordUpdate, StageChange, StageSlot, StatusMatch, TaskRecord,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a statement waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite task store
///
/// A connection is not shareable between threads, so it sits behind a mutex.
/// Workers normally open one store each against the same database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection mutex poisoned".to_string()))
    }
}

impl TaskStore for SqliteStore {
    fn find_one(&self, filter: &RecordFilter) -> StorageResult<Option<TaskRecord>> {
        let mut conn = self.conn()?;
        // Deferred transaction: record row and stage rows come from one snapshot
        let tx = conn.transaction()?;
        let record = select_record(&tx, filter)?;
        tx.commit()?;
        Ok(record)
    }

    fn atomic_update(&self, filter: &RecordFilter, update: &RecordUpdate) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (clause, args) = where_clause(filter);
        let sql = format!(
            "SELECT r.id FROM records r WHERE {} ORDER BY r.seq LIMIT 1",
            clause
        );
        let record_id: Option<String> = tx
            .query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))
            .optional()?;

        let Some(record_id) = record_id else {
            return Ok(false);
        };

        if let Some(change) = &update.stage {
            apply_stage_change(&tx, &record_id, change)?;
        }

        if update.payload_patch.is_some() || update.lock {
            let patch = match &update.payload_patch {
                Some(patch) => serde_json::to_string(patch)?,
                None => "{}".to_string(),
            };
            // The lock flag only ever goes from 0 to 1
            tx.execute(
                "UPDATE records SET payload = json_patch(payload, ?1), locked = MAX(locked, ?2)
                 WHERE id = ?3",
                params![patch, update.lock, record_id],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    fn insert(&self, record: &TaskRecord) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let payload = serde_json::to_string(&record.payload)?;
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO records (id, kind, parent_id, payload, locked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.kind.to_db_string(),
                record.parent_id,
                payload,
                record.locked,
                format_ts(&record.created_at),
            ],
        )?;

        if inserted == 0 {
            return Ok(false);
        }

        for (stage, slot) in &record.stages {
            tx.execute(
                "INSERT INTO stage_status
                 (record_id, stage, status, claimed_at, claimed_by, error, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    stage.to_db_string(),
                    slot.status.to_db_string(),
                    slot.claimed_at.as_ref().map(format_ts),
                    slot.claimed_by,
                    slot.error,
                    format_ts(&slot.updated_at),
                ],
            )?;
        }

        tx.commit()?;
        Ok(true)
    }

    fn count(&self, filter: &RecordFilter) -> StorageResult<u64> {
        let conn = self.conn()?;
        let (clause, args) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM records r WHERE {}", clause);
        let count: i64 = conn.query_row(&sql, params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn status_counts(&self, stage: Stage) -> StorageResult<HashMap<StageStatus, u64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM stage_status WHERE stage = ?1 GROUP BY status",
        )?;

        let rows = stmt.query_map(params![stage.to_db_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (status_str, count) = row?;
            if let Some(status) = StageStatus::from_db_string(&status_str) {
                counts.insert(status, count as u64);
            }
        }

        Ok(counts)
    }
}

/// Renders a filter as a SQL condition over `records r`
///
/// Stage conditions become `EXISTS` subqueries against `stage_status`, so a
/// record that does not take part in a stage never matches a condition on it.
fn where_clause(filter: &RecordFilter) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut args = Vec::new();

    if let Some(id) = &filter.id {
        clauses.push("r.id = ?".to_string());
        args.push(SqlValue::Text(id.clone()));
    }

    if let Some(kind) = filter.kind {
        clauses.push("r.kind = ?".to_string());
        args.push(text(kind.to_db_string()));
    }

    if let Some(locked) = filter.locked {
        clauses.push("r.locked = ?".to_string());
        args.push(SqlValue::Integer(i64::from(locked)));
    }

    for (stage, status) in &filter.stages {
        args.push(text(stage.to_db_string()));

        let condition = match status {
            StatusMatch::Is(status) => {
                args.push(text(status.to_db_string()));
                "s.status = ?".to_string()
            }
            StatusMatch::Claimable { stale_before: None } => {
                args.push(text(StageStatus::Pending.to_db_string()));
                "s.status = ?".to_string()
            }
            StatusMatch::Claimable {
                stale_before: Some(cutoff),
            } => {
                args.push(text(StageStatus::Pending.to_db_string()));
                args.push(text(StageStatus::InProgress.to_db_string()));
                args.push(SqlValue::Text(format_ts(cutoff)));
                "(s.status = ? OR (s.status = ? AND s.claimed_at < ?))".to_string()
            }
            StatusMatch::HeldBy(owner) => {
                args.push(text(StageStatus::InProgress.to_db_string()));
                args.push(SqlValue::Text(owner.clone()));
                "s.status = ? AND s.claimed_by = ?".to_string()
            }
        };

        clauses.push(format!(
            "EXISTS (SELECT 1 FROM stage_status s WHERE s.record_id = r.id AND s.stage = ? AND {})",
            condition
        ));
    }

    if clauses.is_empty() {
        ("1 = 1".to_string(), args)
    } else {
        (clauses.join(" AND "), args)
    }
}

fn select_record(conn: &Connection, filter: &RecordFilter) -> StorageResult<Option<TaskRecord>> {
    let (clause, args) = where_clause(filter);
    let sql = format!(
        "SELECT r.id, r.kind, r.parent_id, r.payload, r.locked, r.created_at
         FROM records r WHERE {} ORDER BY r.seq LIMIT 1",
        clause
    );

    let record = conn
        .query_row(&sql, params_from_iter(args.iter()), |row| {
            let kind_str: String = row.get(1)?;
            let kind = RecordKind::from_db_string(&kind_str).ok_or_else(|| {
                conversion_error(1, format!("unknown record kind '{}'", kind_str))
            })?;
            let payload_str: String = row.get(3)?;
            let payload = serde_json::from_str(&payload_str)
                .map_err(|e| conversion_error(3, e.to_string()))?;

            Ok(TaskRecord {
                id: row.get(0)?,
                kind,
                parent_id: row.get(2)?,
                stages: BTreeMap::new(),
                payload,
                locked: row.get(4)?,
                created_at: parse_ts(5, &row.get::<_, String>(5)?)?,
            })
        })
        .optional()?;

    let Some(mut record) = record else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT stage, status, claimed_at, claimed_by, error, updated_at
         FROM stage_status WHERE record_id = ?1",
    )?;

    let rows = stmt.query_map(params![record.id], |row| {
        let stage_str: String = row.get(0)?;
        let stage = Stage::from_db_string(&stage_str)
            .ok_or_else(|| conversion_error(0, format!("unknown stage '{}'", stage_str)))?;
        let status_str: String = row.get(1)?;
        let status = StageStatus::from_db_string(&status_str)
            .ok_or_else(|| conversion_error(1, format!("unknown status '{}'", status_str)))?;
        let claimed_at = match row.get::<_, Option<String>>(2)? {
            Some(raw) => Some(parse_ts(2, &raw)?),
            None => None,
        };

        Ok((
            stage,
            StageSlot {
                status,
                claimed_at,
                claimed_by: row.get(3)?,
                error: row.get(4)?,
                updated_at: parse_ts(5, &row.get::<_, String>(5)?)?,
            },
        ))
    })?;

    for row in rows {
        let (stage, slot) = row?;
        record.stages.insert(stage, slot);
    }

    Ok(Some(record))
}

/// Applies one stage transition, rejecting edges the state machine forbids
fn apply_stage_change(
    tx: &Transaction<'_>,
    record_id: &str,
    change: &StageChange,
) -> StorageResult<()> {
    let current: Option<String> = tx
        .query_row(
            "SELECT status FROM stage_status WHERE record_id = ?1 AND stage = ?2",
            params![record_id, change.stage.to_db_string()],
            |row| row.get(0),
        )
        .optional()?;

    let current = current.ok_or_else(|| {
        StorageError::ConstraintViolation(format!(
            "record {} does not take part in stage {}",
            record_id, change.stage
        ))
    })?;
    let from = StageStatus::from_db_string(&current)
        .ok_or_else(|| StorageError::Database(format!("unknown stage status '{}'", current)))?;

    if !from.can_transition_to(change.status) {
        return Err(StorageError::InvalidTransition {
            record_id: record_id.to_string(),
            stage: change.stage,
            from,
            to: change.status,
        });
    }

    let at = format_ts(&change.at);
    if change.status == StageStatus::InProgress {
        tx.execute(
            "UPDATE stage_status
             SET status = ?1, claimed_at = ?2, claimed_by = ?3, error = NULL, updated_at = ?2
             WHERE record_id = ?4 AND stage = ?5",
            params![
                change.status.to_db_string(),
                at,
                change.claimed_by,
                record_id,
                change.stage.to_db_string()
            ],
        )?;
    } else {
        tx.execute(
            "UPDATE stage_status SET status = ?1, error = ?2, updated_at = ?3
             WHERE record_id = ?4 AND stage = ?5",
            params![
                change.status.to_db_string(),
                change.error,
                at,
                record_id,
                change.stage.to_db_string()
            ],
        )?;
    }

    Ok(())
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

/// Fixed-width UTC timestamps, so lexical order in SQL matches time order
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}
