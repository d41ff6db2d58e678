//! Verification outcomes.
//!
//! Produced fresh per `verify` call. A result gates a transition; it is
//! never persisted as authoritative record state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::WallClock;

use super::source::SourceKind;

/// One field-level discrepancy between the local record and the upstream
/// answers, or between the answers themselves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMismatch {
    pub field: String,
    /// What the local record expects.
    pub expected: String,
    /// Value each responding source reported for the field.
    pub observed: BTreeMap<SourceKind, String>,
}

/// Why a result is invalid. The two reasons carry different retry policy:
/// a mismatch is terminal for the attempt, unavailability is retryable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Both upstreams answered and disagree on identity fields.
    Mismatch,
    /// Neither upstream could be reached (timeout or open circuit).
    Unavailable,
}

/// Outcome of one dual-protocol verification call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub mismatches: Vec<FieldMismatch>,
    pub checked_at: WallClock,
    /// Which of the two protocols actually answered.
    pub sources: Vec<SourceKind>,
    /// True when only one channel confirmed; preserved in the audit trail.
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
}

impl VerificationResult {
    pub fn confirmed(sources: Vec<SourceKind>, degraded: bool, checked_at: WallClock) -> Self {
        Self {
            is_valid: true,
            mismatches: Vec::new(),
            checked_at,
            sources,
            degraded,
            reason: None,
        }
    }

    pub fn mismatched(
        mismatches: Vec<FieldMismatch>,
        sources: Vec<SourceKind>,
        checked_at: WallClock,
    ) -> Self {
        Self {
            is_valid: false,
            mismatches,
            checked_at,
            sources,
            degraded: false,
            reason: Some(InvalidReason::Mismatch),
        }
    }

    pub fn unavailable(checked_at: WallClock) -> Self {
        Self {
            is_valid: false,
            mismatches: Vec::new(),
            checked_at,
            sources: Vec::new(),
            degraded: false,
            reason: Some(InvalidReason::Unavailable),
        }
    }
}
