//! Orchestrator error taxonomy.
//!
//! Causal conflicts never appear here: the merge engine resolves them
//! silently by design. Everything else is surfaced immediately - swallowing
//! a mismatch or an invalid transition would produce an incorrect clinical
//! record.

use thiserror::Error;

use crate::core::{CoreError, EntityId, InvalidTransition};
use crate::error::{Effect, Transience};
use crate::verify::{FieldMismatch, VerificationResult};

use super::storage::StorageError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Both protocols answered and disagree with the record. Terminal for
    /// this attempt; field detail goes to the caller for escalation.
    #[error("verification mismatch for `{entity}` on {} field(s)", mismatches.len())]
    VerificationMismatch {
        entity: EntityId,
        mismatches: Vec<FieldMismatch>,
        result: VerificationResult,
    },

    /// Neither protocol could be reached. Retryable by policy.
    #[error("both upstream protocols unavailable for `{entity}`")]
    UpstreamUnavailable {
        entity: EntityId,
        result: VerificationResult,
    },

    /// Transition outside the fixed table. Programming/workflow error.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Storage compare-and-swap lost to a concurrent commit, and the single
    /// re-read retry lost again.
    #[error("stale write for `{entity}`: another transition committed first")]
    StaleWrite { entity: EntityId },

    #[error("record `{entity}` does not exist")]
    NotFound { entity: EntityId },

    /// Entity id and requested status belong to different record kinds.
    #[error("`{entity}` cannot move to a {expected} status")]
    WrongEntityKind {
        entity: EntityId,
        expected: &'static str,
    },

    /// A plain edit tried to smuggle in a trust-requiring status.
    #[error("status `{status}` for `{entity}` requires a verified transition")]
    TrustRequired {
        entity: EntityId,
        status: &'static str,
    },

    /// The handover reached a terminal state and only admits reads.
    #[error("handover `{entity}` is archived")]
    HandoverArchived { entity: EntityId },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SyncError {
    pub fn transience(&self) -> Transience {
        match self {
            SyncError::UpstreamUnavailable { .. } => Transience::Retryable,
            SyncError::StaleWrite { .. } => Transience::Retryable,
            SyncError::VerificationMismatch { .. } => Transience::Permanent,
            SyncError::InvalidTransition(_) => Transience::Permanent,
            SyncError::NotFound { .. } => Transience::Permanent,
            SyncError::WrongEntityKind { .. } => Transience::Permanent,
            SyncError::TrustRequired { .. } => Transience::Permanent,
            SyncError::HandoverArchived { .. } => Transience::Permanent,
            SyncError::Core(e) => e.transience(),
            SyncError::Storage(e) => e.transience(),
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            // A failed handover completion moves the aggregate to
            // VerificationRequired; the task records are untouched.
            SyncError::VerificationMismatch { .. } => Effect::Unknown,
            SyncError::UpstreamUnavailable { .. } => Effect::Unknown,
            SyncError::Storage(e) => e.effect(),
            _ => Effect::None,
        }
    }
}
