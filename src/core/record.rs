//! Layer 3: Versioned records and task domain types
//!
//! Every entity subject to concurrent edit travels as a `VersionedRecord`:
//! payload + causal version + tombstone marker. Tombstoned records are
//! retained and merged like any other edit, never physically removed here.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{CoreError, InvalidStatus};
use super::identity::{HandoverId, PatientRef};
use super::version::CausalVersion;

/// Clinical urgency of a task.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Routine,
    Urgent,
    Stat,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Urgent => "urgent",
            Self::Stat => "stat",
        }
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "routine" => Ok(Self::Routine),
            "urgent" => Ok(Self::Urgent),
            "stat" => Ok(Self::Stat),
            _ => Err(InvalidStatus {
                kind: "priority",
                raw: s.to_string(),
            }
            .into()),
        }
    }
}

/// Task lifecycle status.
///
/// `Completed` is trust-requiring: the orchestrator will not commit it
/// without a passing verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses a task may move to from `self`. Fixed and exhaustive.
    pub fn allowed_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::InProgress, Self::Completed, Self::Cancelled],
            Self::InProgress => &[Self::Pending, Self::Completed, Self::Cancelled],
            Self::Completed => &[],
            Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: TaskStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Whether committing this status requires a passing verification.
    pub fn requires_verification(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(InvalidStatus {
                kind: "task",
                raw: s.to_string(),
            }
            .into()),
        }
    }
}

/// The mutable body of a clinical task.
///
/// Fields are coarse-grained: merges replace the whole payload, never
/// individual fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Handover this task belongs to.
    pub handover: HandoverId,
    /// Patient the task concerns; cross-checked against both upstreams.
    pub patient: PatientRef,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
}

/// A payload plus the causal metadata that makes it mergeable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedRecord<T> {
    pub payload: T,
    pub version: CausalVersion,
    #[serde(default)]
    pub tombstone: bool,
}

impl<T> VersionedRecord<T> {
    pub fn new(payload: T, version: CausalVersion) -> Self {
        Self {
            payload,
            version,
            tombstone: false,
        }
    }

    /// Tombstoned record: deletion expressed as a versioned edit.
    pub fn retracted(payload: T, version: CausalVersion) -> Self {
        Self {
            payload,
            version,
            tombstone: true,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.tombstone
    }
}

/// Task record as stored and synchronized.
pub type TaskRecord = VersionedRecord<TaskPayload>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_table_is_closed() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Cancelled.can_transition_to(TaskStatus::InProgress));
    }

    #[test]
    fn only_completed_requires_verification() {
        assert!(TaskStatus::Completed.requires_verification());
        assert!(!TaskStatus::InProgress.requires_verification());
        assert!(!TaskStatus::Cancelled.requires_verification());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }
}
