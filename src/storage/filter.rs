//! Record filters and updates
//!
//! These are the query vocabulary of the task store. The claim scheduler
//! composes them into eligibility predicates and conditional updates.

use crate::state::{Stage, StageStatus};
use crate::storage::{RecordKind, TaskRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// How a filter constrains the status of one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StatusMatch {
    /// Status equals the given value
    Is(StageStatus),

    /// `pending`, or `in_progress` with a claim older than `stale_before`
    Claimable {
        stale_before: Option<DateTime<Utc>>,
    },

    /// `in_progress` and claimed by the given worker
    HeldBy(String),
}

impl StatusMatch {
    fn matches(&self, slot: &crate::storage::StageSlot) -> bool {
        match self {
            Self::Is(status) => slot.status == *status,
            Self::Claimable { stale_before } => match slot.status {
                StageStatus::Pending => true,
                StageStatus::InProgress => match (stale_before, slot.claimed_at) {
                    (Some(cutoff), Some(claimed_at)) => claimed_at < *cutoff,
                    _ => false,
                },
                _ => false,
            },
            Self::HeldBy(owner) => {
                slot.status == StageStatus::InProgress
                    && slot.claimed_by.as_deref() == Some(owner.as_str())
            }
        }
    }
}

/// A conjunction of conditions over task records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub id: Option<String>,
    pub kind: Option<RecordKind>,
    pub locked: Option<bool>,
    pub stages: Vec<(Stage, StatusMatch)>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn kind(mut self, kind: RecordKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Only records without the permanent exclusion flag
    pub fn unlocked(mut self) -> Self {
        self.locked = Some(false);
        self
    }

    /// Only records with the permanent exclusion flag
    pub fn locked(mut self) -> Self {
        self.locked = Some(true);
        self
    }

    pub fn stage(mut self, stage: Stage, status: StatusMatch) -> Self {
        self.stages.push((stage, status));
        self
    }

    /// Eligibility predicate for claiming work in `stage`
    ///
    /// A record is eligible when it is claimable for `stage`, `done` with the
    /// previous stage (if any), and not locked. With `stale_before` set,
    /// `in_progress` claims older than the cutoff are also eligible.
    pub fn eligible(stage: Stage, stale_before: Option<DateTime<Utc>>) -> Self {
        let mut filter = Self::new()
            .stage(stage, StatusMatch::Claimable { stale_before })
            .unlocked();
        if let Some(previous) = stage.previous() {
            filter = filter.stage(previous, StatusMatch::Is(StageStatus::Done));
        }
        filter
    }

    /// Evaluates the filter against an in-memory record
    pub fn matches(&self, record: &TaskRecord) -> bool {
        if let Some(id) = &self.id {
            if &record.id != id {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if record.kind != kind {
                return false;
            }
        }
        if let Some(locked) = self.locked {
            if record.locked != locked {
                return false;
            }
        }
        self.stages.iter().all(|(stage, status)| {
            record
                .slot(*stage)
                .map(|slot| status.matches(slot))
                .unwrap_or(false)
        })
    }
}

/// A status transition for one stage of a record
#[derive(Debug, Clone, PartialEq)]
pub struct StageChange {
    pub stage: Stage,
    pub status: StageStatus,
    /// Worker taking the claim; only meaningful when `status` is `in_progress`
    pub claimed_by: Option<String>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Mutation applied by `TaskStore::atomic_update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub stage: Option<StageChange>,
    /// JSON merge patch (RFC 7396) applied to the record payload
    pub payload_patch: Option<Value>,
    /// Sets the permanent exclusion flag; `false` leaves it untouched
    pub lock: bool,
}

impl RecordUpdate {
    /// Marks `stage` as `in_progress`, held by `owner`
    pub fn claim(stage: Stage, owner: &str, at: DateTime<Utc>) -> Self {
        Self {
            stage: Some(StageChange {
                stage,
                status: StageStatus::InProgress,
                claimed_by: Some(owner.to_string()),
                error: None,
                at,
            }),
            ..Self::default()
        }
    }

    /// Moves `stage` to a terminal status
    pub fn finish(
        stage: Stage,
        status: StageStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        debug_assert!(status.is_terminal(), "finish needs a terminal status");
        Self {
            stage: Some(StageChange {
                stage,
                status,
                claimed_by: None,
                error,
                at,
            }),
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, patch: Option<Value>) -> Self {
        self.payload_patch = patch;
        self
    }

    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }
}
