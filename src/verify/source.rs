//! Upstream source capability.
//!
//! Exactly two protocol channels exist: a structured resource protocol
//! (FHIR-style) and a legacy segment-based protocol (HL7v2-style). Adapters
//! normalize whatever they fetch into `EntityFacts`; the gate only ever
//! sees the normalized form.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{EntityId, PatientRef};

/// Closed set of upstream protocol channels, selected by static
/// configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Structured resource protocol.
    Fhir,
    /// Legacy segment-based message protocol.
    Hl7,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fhir => "fhir",
            Self::Hl7 => "hl7",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the gate asks an upstream about.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity: EntityId,
    pub patient: PatientRef,
    /// Local status string the upstream answer is checked against.
    pub status: String,
}

/// Normalized upstream answer: the overlapping identity fields both
/// protocols can speak to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFacts {
    pub patient: PatientRef,
    pub status: String,
    /// Raw upstream payload, retained for the audit trail only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Failure fetching from one upstream.
///
/// Classification decides retry eligibility: only transient/network-class
/// failures are retried, never validation failures.
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("transient upstream failure: {0}")]
    Transient(String),
    #[error("terminal upstream failure: {0}")]
    Terminal(String),
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_) | FetchError::Timeout(_))
    }
}

/// One independently-addressable upstream protocol channel.
///
/// Implementations must honor `timeout`: a call that cannot answer within
/// the budget returns `FetchError::Timeout` rather than blocking.
pub trait UpstreamSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn fetch_entity(&self, entity: &EntityRef, timeout: Duration) -> Result<EntityFacts, FetchError>;
}
