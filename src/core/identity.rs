//! Layer 1: Identity atoms
//!
//! ReplicaId: a disconnected client or the server replica
//! ActorId: clinician self-identification
//! TaskId / HandoverId: record identifiers with prefix
//! ShiftId: shift window label
//! PatientRef: opaque patient identity shared with the upstream protocols

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{CoreError, InvalidId};

/// Alphabet for generated and hand-written id suffixes.
const ID_ALPHABET: &[u8] = b"0123456789abcdef";

fn valid_suffix(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| ID_ALPHABET.contains(&b) || b == b'-')
}

/// Replica identifier - non-empty, lowercase alphanumeric plus `-`.
///
/// Replica ids participate in the LWW tie-break, so their byte order is part
/// of the merge contract.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::Replica {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(InvalidId::Replica {
                raw: s,
                reason: "must be lowercase alphanumeric or '-'".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaId({:?})", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Actor identifier - non-empty string.
///
/// Clinicians name themselves. No validation beyond non-empty.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::Actor {
                raw: s,
                reason: "empty".into(),
            }
            .into())
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({:?})", self.0)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task identifier - `tsk-{suffix}` format.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Parse and validate a task id string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.strip_prefix("tsk-") {
            Some(rest) if valid_suffix(rest) => Ok(Self(s.to_string())),
            Some(_) => Err(InvalidId::Task {
                raw: s.to_string(),
                reason: "suffix must be lowercase hex or '-'".into(),
            }
            .into()),
            None => Err(InvalidId::Task {
                raw: s.to_string(),
                reason: "must start with 'tsk-'".into(),
            }
            .into()),
        }
    }

    /// Generate a fresh id with a random suffix.
    pub fn generate() -> Self {
        Self(format!("tsk-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({:?})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handover identifier - `hov-{suffix}` format.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandoverId(String);

impl HandoverId {
    /// Parse and validate a handover id string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.strip_prefix("hov-") {
            Some(rest) if valid_suffix(rest) => Ok(Self(s.to_string())),
            Some(_) => Err(InvalidId::Handover {
                raw: s.to_string(),
                reason: "suffix must be lowercase hex or '-'".into(),
            }
            .into()),
            None => Err(InvalidId::Handover {
                raw: s.to_string(),
                reason: "must start with 'hov-'".into(),
            }
            .into()),
        }
    }

    /// Generate a fresh id with a random suffix.
    pub fn generate() -> Self {
        Self(format!("hov-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HandoverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandoverId({:?})", self.0)
    }
}

impl fmt::Display for HandoverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shift window label - non-empty (e.g. `2026-08-24-night`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShiftId(String);

impl ShiftId {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::Shift {
                raw: s,
                reason: "empty".into(),
            }
            .into())
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ShiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShiftId({:?})", self.0)
    }
}

impl fmt::Display for ShiftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Patient reference - the identity shared with both upstream protocols.
///
/// Opaque to the engine; compared byte-for-byte during cross-checks.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientRef(String);

impl PatientRef {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::Patient {
                raw: s,
                reason: "empty".into(),
            }
            .into())
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PatientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PatientRef({:?})", self.0)
    }
}

impl fmt::Display for PatientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to any verifiable / synchronizable entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityId {
    Task(TaskId),
    Handover(HandoverId),
}

impl EntityId {
    pub fn as_str(&self) -> &str {
        match self {
            EntityId::Task(id) => id.as_str(),
            EntityId::Handover(id) => id.as_str(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<TaskId> for EntityId {
    fn from(id: TaskId) -> Self {
        EntityId::Task(id)
    }
}

impl From<HandoverId> for EntityId {
    fn from(id: HandoverId) -> Self {
        EntityId::Handover(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_id_rejects_uppercase_and_empty() {
        assert!(ReplicaId::parse("ward-3-tablet").is_ok());
        assert!(ReplicaId::parse("").is_err());
        assert!(ReplicaId::parse("Ward3").is_err());
        assert!(ReplicaId::parse("ward_3").is_err());
    }

    #[test]
    fn task_id_requires_prefix() {
        assert!(TaskId::parse("tsk-0a1b2c").is_ok());
        assert!(TaskId::parse("task-0a1b").is_err());
        assert!(TaskId::parse("tsk-").is_err());
        assert!(TaskId::parse("tsk-XYZ").is_err());
    }

    #[test]
    fn generated_ids_parse_back() {
        let t = TaskId::generate();
        assert_eq!(TaskId::parse(t.as_str()).unwrap(), t);
        let h = HandoverId::generate();
        assert_eq!(HandoverId::parse(h.as_str()).unwrap(), h);
    }

    #[test]
    fn entity_id_displays_inner() {
        let t = TaskId::parse("tsk-42").unwrap();
        assert_eq!(EntityId::from(t).to_string(), "tsk-42");
    }
}
