//! Core capability errors (parsing, validation, lifecycle invariants).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details.

use thiserror::Error;

use crate::error::{Effect, Transience};

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("replica id `{raw}` is invalid: {reason}")]
    Replica { raw: String, reason: String },
    #[error("actor id `{raw}` is invalid: {reason}")]
    Actor { raw: String, reason: String },
    #[error("task id `{raw}` is invalid: {reason}")]
    Task { raw: String, reason: String },
    #[error("handover id `{raw}` is invalid: {reason}")]
    Handover { raw: String, reason: String },
    #[error("shift id `{raw}` is invalid: {reason}")]
    Shift { raw: String, reason: String },
    #[error("patient ref `{raw}` is invalid: {reason}")]
    Patient { raw: String, reason: String },
}

/// Invalid status string.
#[derive(Debug, Error, Clone)]
#[error("{kind} status `{raw}` is invalid")]
pub struct InvalidStatus {
    pub kind: &'static str,
    pub raw: String,
}

/// Attempted lifecycle transition not present in the fixed table.
///
/// Always a caller/workflow error; never coerced or silently absorbed.
#[derive(Debug, Error, Clone)]
#[error("invalid {kind} transition {from} -> {to}")]
pub struct InvalidTransition {
    pub kind: &'static str,
    pub from: String,
    pub to: String,
}

/// Canonical error enum for core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatus),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
