//! Layer 5: Handover aggregate
//!
//! A handover is the unit of shift transfer: a set of task records, its own
//! causal version, and a status drawn from a fixed, exhaustive transition
//! table. Terminal handovers are archived, never deleted.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{CoreError, InvalidStatus, InvalidTransition};
use super::identity::{HandoverId, ShiftId, TaskId};
use super::time::WallClock;
use super::version::CausalVersion;

/// Handover lifecycle status.
///
/// Happy path: `Preparing -> Ready -> InProgress -> Completed`.
/// `VerificationRequired` / `VerificationFailed` / `Rejected` are side
/// branches; `Completed` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoverStatus {
    Preparing,
    Ready,
    InProgress,
    VerificationRequired,
    VerificationFailed,
    Rejected,
    Completed,
}

impl HandoverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::VerificationRequired => "verification_required",
            Self::VerificationFailed => "verification_failed",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        }
    }

    /// The fixed transition table. Anything not listed fails fast.
    pub fn allowed_transitions(&self) -> &'static [HandoverStatus] {
        match self {
            Self::Preparing => &[Self::Ready],
            Self::Ready => &[Self::InProgress, Self::Rejected],
            Self::InProgress => &[
                Self::Completed,
                Self::VerificationRequired,
                Self::Rejected,
            ],
            Self::VerificationRequired => {
                &[Self::InProgress, Self::Completed, Self::VerificationFailed]
            }
            Self::VerificationFailed => &[Self::VerificationRequired, Self::Rejected],
            Self::Completed => &[],
            Self::Rejected => &[],
        }
    }

    pub fn can_transition_to(&self, target: HandoverStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Whether committing this status requires a passing verification.
    pub fn requires_verification(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl FromStr for HandoverStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparing" => Ok(Self::Preparing),
            "ready" => Ok(Self::Ready),
            "in_progress" => Ok(Self::InProgress),
            "verification_required" => Ok(Self::VerificationRequired),
            "verification_failed" => Ok(Self::VerificationFailed),
            "rejected" => Ok(Self::Rejected),
            "completed" => Ok(Self::Completed),
            _ => Err(InvalidStatus {
                kind: "handover",
                raw: s.to_string(),
            }
            .into()),
        }
    }
}

/// Handover aggregate.
///
/// Task records themselves live in storage keyed by id; the aggregate tracks
/// membership plus which tasks have passed verification in the current
/// window. The window resets whenever the handover (re-)enters `InProgress`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handover {
    pub id: HandoverId,
    pub shift: ShiftId,
    pub status: HandoverStatus,
    pub version: CausalVersion,
    pub tasks: BTreeSet<TaskId>,
    /// Tasks that passed verification since the window opened.
    #[serde(default)]
    pub verified: BTreeSet<TaskId>,
    /// Set once a terminal status is reached; archived aggregates are kept.
    #[serde(default)]
    pub archived: bool,
}

impl Handover {
    /// New handover at a shift boundary, in `Preparing`.
    pub fn open(id: HandoverId, shift: ShiftId, version: CausalVersion) -> Self {
        Self {
            id,
            shift,
            status: HandoverStatus::Preparing,
            version,
            tasks: BTreeSet::new(),
            verified: BTreeSet::new(),
            archived: false,
        }
    }

    /// Apply a status transition, stamping a new version.
    ///
    /// Rejects anything outside the fixed table; the caller decides what
    /// verification must have happened first.
    pub fn transition(
        &mut self,
        target: HandoverStatus,
        wall: WallClock,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(target) {
            return Err(InvalidTransition {
                kind: "handover",
                from: self.status.as_str().to_string(),
                to: target.as_str().to_string(),
            });
        }
        if target == HandoverStatus::InProgress {
            // New verification window: prior passes no longer count.
            self.verified.clear();
        }
        self.status = target;
        self.version = self.version.advance(wall);
        if target.is_terminal() {
            self.archived = true;
        }
        Ok(())
    }

    /// Record that a constituent task passed verification in this window.
    pub fn mark_verified(&mut self, task: &TaskId, wall: WallClock) {
        if self.tasks.contains(task) && self.verified.insert(task.clone()) {
            self.version = self.version.advance(wall);
        }
    }

    /// Tasks still lacking a pass in the current window.
    pub fn unverified_tasks(&self) -> impl Iterator<Item = &TaskId> {
        self.tasks.iter().filter(|t| !self.verified.contains(*t))
    }

    pub fn contains_task(&self, task: &TaskId) -> bool {
        self.tasks.contains(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::ReplicaId;

    fn handover() -> Handover {
        let version = CausalVersion::first(
            ReplicaId::parse("server").unwrap(),
            WallClock::new(1),
        );
        Handover::open(
            HandoverId::parse("hov-1").unwrap(),
            ShiftId::new("2026-08-24-night").unwrap(),
            version,
        )
    }

    #[test]
    fn happy_path_reaches_completed() {
        let mut h = handover();
        for (i, status) in [
            HandoverStatus::Ready,
            HandoverStatus::InProgress,
            HandoverStatus::Completed,
        ]
        .into_iter()
        .enumerate()
        {
            h.transition(status, WallClock::new(10 + i as u64)).unwrap();
        }
        assert_eq!(h.status, HandoverStatus::Completed);
        assert!(h.archived);
    }

    #[test]
    fn transitions_outside_table_fail_fast() {
        let mut h = handover();
        let err = h
            .transition(HandoverStatus::Completed, WallClock::new(10))
            .unwrap_err();
        assert_eq!(err.from, "preparing");
        assert_eq!(err.to, "completed");
        // State untouched on refusal.
        assert_eq!(h.status, HandoverStatus::Preparing);
    }

    #[test]
    fn terminal_states_admit_nothing() {
        let mut h = handover();
        h.transition(HandoverStatus::Ready, WallClock::new(10)).unwrap();
        h.transition(HandoverStatus::Rejected, WallClock::new(11)).unwrap();
        assert!(h.archived);
        assert!(h
            .transition(HandoverStatus::Ready, WallClock::new(12))
            .is_err());
    }

    #[test]
    fn every_transition_advances_version() {
        let mut h = handover();
        let v0 = h.version.clone();
        h.transition(HandoverStatus::Ready, WallClock::new(10)).unwrap();
        assert!(h.version.compare(&v0) == crate::core::Causality::After);
    }

    #[test]
    fn window_resets_on_entering_in_progress() {
        let mut h = handover();
        let task = TaskId::parse("tsk-1").unwrap();
        h.tasks.insert(task.clone());
        h.transition(HandoverStatus::Ready, WallClock::new(10)).unwrap();
        h.transition(HandoverStatus::InProgress, WallClock::new(11)).unwrap();
        h.mark_verified(&task, WallClock::new(12));
        assert_eq!(h.unverified_tasks().count(), 0);

        h.transition(HandoverStatus::VerificationRequired, WallClock::new(13))
            .unwrap();
        h.transition(HandoverStatus::InProgress, WallClock::new(14)).unwrap();
        assert_eq!(h.unverified_tasks().count(), 1);
    }

    #[test]
    fn mark_verified_ignores_foreign_tasks() {
        let mut h = handover();
        let v0 = h.version.clone();
        h.mark_verified(&TaskId::parse("tsk-9").unwrap(), WallClock::new(10));
        assert_eq!(h.version, v0);
    }
}
