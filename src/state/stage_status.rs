/// Per-stage status definitions for task records
///
/// Every (record, stage) pair carries exactly one of these values.
use std::fmt;

/// Represents the status of a record within a single pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageStatus {
    // ===== Active States =====
    /// Waiting to be claimed by a worker
    Pending,

    /// Claimed by exactly one worker
    InProgress,

    // ===== Terminal States =====
    /// Stage handler completed successfully
    Done,

    /// Stage handler raised an error; the record is skipped for this stage
    Failed,
}

impl StageStatus {
    /// Returns true if no further transition is possible for this stage
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the record may still be processed in this stage
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Checks whether moving from `self` to `next` is a legal edge
    ///
    /// The only edges are `pending -> in_progress` and
    /// `in_progress -> {done, failed}`. A stale claim being re-offered is
    /// modelled as `in_progress -> in_progress`.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::InProgress)
                | (Self::InProgress, Self::Done)
                | (Self::InProgress, Self::Failed)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 4] {
        [Self::Pending, Self::InProgress, Self::Done, Self::Failed]
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
