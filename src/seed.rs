//! Surname seeding
//!
//! Reads the surname list and registers each name as a record pending
//! discovery. Seeding is idempotent: names already in the store are skipped,
//! and only `name_count` new names are added per run.

use crate::crawler::ClaimScheduler;
use crate::storage::{StorageResult, TaskRecord, TaskStore};
use crate::HarvestError;
use serde_json::Value;
use std::path::Path;

/// Outcome of one seeding pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub added: usize,
    pub skipped: usize,
}

/// Reads a JSON array of names
///
/// Non-string entries are stringified; every name is trimmed and lower-cased.
/// Blank entries are dropped.
pub fn load_name_list(path: &Path) -> crate::Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::SeedList {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let values: Vec<Value> = serde_json::from_str(&content).map_err(|e| HarvestError::SeedList {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    Ok(values
        .into_iter()
        .map(|value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect())
}

/// Registers surnames until `name_count` new ones have been added
pub fn seed_surnames<S: TaskStore>(
    scheduler: &ClaimScheduler<S>,
    names: &[String],
    name_count: usize,
) -> StorageResult<SeedReport> {
    let mut report = SeedReport::default();

    for name in names {
        if report.added >= name_count {
            break;
        }

        if scheduler.register(&TaskRecord::surname(name))? {
            tracing::info!(surname = %name, "Surname added");
            report.added += 1;
        } else {
            tracing::debug!(surname = %name, "Surname already known, skipping");
            report.skipped += 1;
        }
    }

    tracing::info!(added = report.added, skipped = report.skipped, "Seeding complete");
    Ok(report)
}
