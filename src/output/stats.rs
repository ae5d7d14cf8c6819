//! Statistics generation from the task store
//!
//! This module provides functionality for extracting and displaying
//! pipeline statistics from the storage layer.

use crate::state::{Stage, StageStatus};
use crate::storage::{RecordFilter, RecordKind, StorageError, TaskStore};
use std::collections::{BTreeMap, HashMap};

/// Pipeline statistics summary
#[derive(Debug, Clone, Default)]
pub struct PipelineStatistics {
    /// Total number of records
    pub total_records: u64,

    /// Surname records
    pub surnames: u64,

    /// Profile records
    pub profiles: u64,

    /// Records with the permanent exclusion flag
    pub locked: u64,

    /// Count of records by status, per stage
    pub by_stage: BTreeMap<Stage, HashMap<StageStatus, u64>>,
}

impl PipelineStatistics {
    pub fn count(&self, stage: Stage, status: StageStatus) -> u64 {
        self.by_stage
            .get(&stage)
            .and_then(|counts| counts.get(&status))
            .copied()
            .unwrap_or(0)
    }

    /// Records that can still be processed in `stage` (pending or held)
    pub fn outstanding(&self, stage: Stage) -> u64 {
        self.by_stage
            .get(&stage)
            .map(|counts| {
                counts
                    .iter()
                    .filter(|(status, _)| status.is_active())
                    .map(|(_, count)| count)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Records a worker still holds, or that a crashed worker left behind
    pub fn in_progress(&self) -> u64 {
        Stage::ALL
            .iter()
            .map(|stage| self.count(*stage, StageStatus::InProgress))
            .sum()
    }
}

/// Loads statistics from the store
///
/// # Arguments
///
/// * `store` - The task store to query
///
/// # Returns
///
/// * `Ok(PipelineStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &dyn TaskStore) -> Result<PipelineStatistics, StorageError> {
    let total_records = store.count(&RecordFilter::new())?;
    let surnames = store.count(&RecordFilter::new().kind(RecordKind::Surname))?;
    let profiles = store.count(&RecordFilter::new().kind(RecordKind::Profile))?;
    let locked = store.count(&RecordFilter::new().locked())?;

    let mut by_stage = BTreeMap::new();
    for stage in Stage::ALL {
        by_stage.insert(stage, store.status_counts(stage)?);
    }

    Ok(PipelineStatistics {
        total_records,
        surnames,
        profiles,
        locked,
        by_stage,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &PipelineStatistics) {
    println!("=== Pipeline Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!("  Surnames: {}", stats.surnames);
    println!("  Profiles: {}", stats.profiles);
    println!("  Locked: {}", stats.locked);
    println!();

    for (stage, counts) in &stats.by_stage {
        let participating: u64 = counts.values().sum();
        println!("Stage {} ({} records):", stage, participating);

        for status in StageStatus::all() {
            let count = counts.get(&status).copied().unwrap_or(0);
            let percentage = if participating > 0 {
                (count as f64 / participating as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", status, count, percentage);
        }
        println!("  outstanding: {}", stats.outstanding(*stage));
        println!();
    }

    let in_progress = stats.in_progress();
    if in_progress > 0 {
        println!(
            "Note: {} stage claims are still in_progress (running or abandoned)",
            in_progress
        );
    }
}
