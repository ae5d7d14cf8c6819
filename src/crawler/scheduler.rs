//! Claim scheduler
//!
//! Hands out exclusive claims on records, one stage at a time. All
//! coordination goes through the task store: a claim is a conditional update
//! that only succeeds while the record still matches the stage's eligibility
//! predicate, so two workers can never both move the same record to
//! `in_progress`. There is no in-process lock and no shared counter.
//!
//! # Claim protocol
//!
//! 1. `find_one(eligible)` picks a candidate (insertion order)
//! 2. `atomic_update(eligible + id, claim)` takes it
//! 3. If step 2 matched nothing, another worker won the race; go to 1
//!
//! Each retry means a competing worker just moved a record out of the
//! eligible set, so the loop terminates once the set is drained.

use crate::state::{Stage, StageStatus};
use crate::storage::{
    RecordFilter, RecordUpdate, StageSlot, StatusMatch, StorageError, StorageResult, TaskRecord,
    TaskStore,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Upper bound for the claim lease, in seconds (one week)
pub const MAX_LEASE_SECS: u64 = 7 * 24 * 60 * 60;

/// Terminal result of handling one claimed record
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Handler succeeded; optional payload patch and lock flag
    Done { payload: Option<Value>, lock: bool },
    /// Handler failed with a description of the error
    Failed { error: String },
}

impl Outcome {
    pub fn status(&self) -> StageStatus {
        match self {
            Self::Done { .. } => StageStatus::Done,
            Self::Failed { .. } => StageStatus::Failed,
        }
    }
}

/// Claim scheduler bound to one worker identity
pub struct ClaimScheduler<S: TaskStore> {
    store: Arc<S>,
    owner: String,
    lease: Option<Duration>,
}

impl<S: TaskStore> ClaimScheduler<S> {
    /// Creates a scheduler that claims on behalf of `owner`
    ///
    /// `owner` must be unique among concurrently running workers.
    pub fn new(store: Arc<S>, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
            lease: None,
        }
    }

    /// Lets claims older than `lease_secs` be taken over by another worker
    ///
    /// `None` (the default) means an `in_progress` claim is never reclaimed.
    pub fn with_lease_secs(mut self, lease_secs: Option<u64>) -> Self {
        self.lease = lease_secs.map(|secs| Duration::seconds(secs.min(MAX_LEASE_SECS) as i64));
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Configured lease in whole seconds, if any
    pub fn lease_secs(&self) -> Option<i64> {
        self.lease.map(|lease| lease.num_seconds())
    }

    /// Claims the oldest eligible record for `stage`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - The record, now `in_progress` and held by this worker
    /// * `Ok(None)` - Nothing is eligible for `stage`
    /// * `Err(StorageError)` - The store failed
    pub fn claim_next(&self, stage: Stage) -> StorageResult<Option<TaskRecord>> {
        loop {
            let now = Utc::now();
            let eligible = RecordFilter::eligible(stage, self.stale_before(now));

            let Some(mut candidate) = self.store.find_one(&eligible)? else {
                return Ok(None);
            };

            let claim = RecordUpdate::claim(stage, &self.owner, now);
            let targeted = eligible.id(candidate.id.clone());
            if !self.store.atomic_update(&targeted, &claim)? {
                tracing::trace!(record_id = %candidate.id, %stage, "Lost claim race, retrying");
                continue;
            }

            if let Some(previous) = candidate.slot(stage) {
                if previous.status == StageStatus::InProgress {
                    tracing::warn!(
                        record_id = %candidate.id,
                        %stage,
                        previous_owner = previous.claimed_by.as_deref().unwrap_or("unknown"),
                        "Taking over stale claim"
                    );
                }
            }

            candidate.stages.insert(
                stage,
                StageSlot {
                    status: StageStatus::InProgress,
                    claimed_at: Some(now),
                    claimed_by: Some(self.owner.clone()),
                    error: None,
                    updated_at: now,
                },
            );
            tracing::debug!(record_id = %candidate.id, %stage, "Claimed record");
            return Ok(Some(candidate));
        }
    }

    /// Records the terminal outcome of a claim held by this worker
    ///
    /// Payload patch, lock flag and status change are written in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// * `StorageError::ClaimLost` - The record is no longer `in_progress`
    ///   under this worker (for example a lease takeover)
    pub fn finalize(&self, record_id: &str, stage: Stage, outcome: Outcome) -> StorageResult<()> {
        let held = RecordFilter::new()
            .id(record_id)
            .stage(stage, StatusMatch::HeldBy(self.owner.clone()));

        let now = Utc::now();
        let update = match outcome {
            Outcome::Done { payload, lock } => {
                RecordUpdate::finish(stage, StageStatus::Done, None, now)
                    .with_payload(payload)
                    .with_lock(lock)
            }
            Outcome::Failed { error } => {
                RecordUpdate::finish(stage, StageStatus::Failed, Some(error), now)
            }
        };

        if self.store.atomic_update(&held, &update)? {
            Ok(())
        } else {
            Err(StorageError::ClaimLost {
                record_id: record_id.to_string(),
                stage,
            })
        }
    }

    /// Inserts a newly discovered record
    ///
    /// Returns `false` if a record with the same id already exists; the
    /// existing record is left as it is.
    pub fn register(&self, record: &TaskRecord) -> StorageResult<bool> {
        self.store.insert(record)
    }

    fn stale_before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lease.map(|lease| now - lease)
    }
}
