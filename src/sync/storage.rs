//! Storage collaborator.
//!
//! The engine does not choose a persistence technology; it requires only
//! keyed load/save with compare-and-swap on the causal version, so the
//! orchestrator's serialized write path can never lose an update silently.

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::core::{CausalVersion, Handover, HandoverId, ShiftId, TaskId, TaskRecord};
use crate::error::{Effect, Transience};

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum StorageError {
    #[error("record `{id}` not found")]
    NotFound { id: String },
    /// Compare-and-swap rejected: the stored version is no longer the one
    /// the caller read.
    #[error("stale write for `{id}`: another transition committed first")]
    StaleWrite { id: String },
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn transience(&self) -> Transience {
        match self {
            StorageError::NotFound { .. } => Transience::Permanent,
            StorageError::StaleWrite { .. } => Transience::Retryable,
            StorageError::Backend(_) => Transience::Unknown,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            StorageError::Backend(_) => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

/// Persistence seam for versioned records and handover aggregates.
///
/// `expected` carries the version the caller read; `None` means "create,
/// must not exist yet". A mismatch returns `StaleWrite` and writes nothing.
pub trait Storage: Send + Sync {
    fn load_task(&self, id: &TaskId) -> Result<TaskRecord, StorageError>;

    fn save_task(
        &self,
        id: &TaskId,
        expected: Option<&CausalVersion>,
        record: TaskRecord,
    ) -> Result<(), StorageError>;

    fn load_handover(&self, id: &HandoverId) -> Result<Handover, StorageError>;

    fn save_handover(
        &self,
        expected: Option<&CausalVersion>,
        handover: Handover,
    ) -> Result<(), StorageError>;

    fn list_by_shift(&self, shift: &ShiftId) -> Result<Vec<HandoverId>, StorageError>;
}

/// In-memory storage: reference CAS semantics for tests and embeddings
/// that have not picked a persistence engine.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tasks: BTreeMap<TaskId, TaskRecord>,
    handovers: BTreeMap<HandoverId, Handover>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStore {
    fn load_task(&self, id: &TaskId) -> Result<TaskRecord, StorageError> {
        self.lock()
            .tasks
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    fn save_task(
        &self,
        id: &TaskId,
        expected: Option<&CausalVersion>,
        record: TaskRecord,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        match (inner.tasks.get(id), expected) {
            (None, None) => {}
            (Some(stored), Some(expected)) if &stored.version == expected => {}
            _ => return Err(StorageError::StaleWrite { id: id.to_string() }),
        }
        inner.tasks.insert(id.clone(), record);
        Ok(())
    }

    fn load_handover(&self, id: &HandoverId) -> Result<Handover, StorageError> {
        self.lock()
            .handovers
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound { id: id.to_string() })
    }

    fn save_handover(
        &self,
        expected: Option<&CausalVersion>,
        handover: Handover,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let id = handover.id.clone();
        match (inner.handovers.get(&id), expected) {
            (None, None) => {}
            (Some(stored), Some(expected)) if &stored.version == expected => {}
            _ => return Err(StorageError::StaleWrite { id: id.to_string() }),
        }
        inner.handovers.insert(id, handover);
        Ok(())
    }

    fn list_by_shift(&self, shift: &ShiftId) -> Result<Vec<HandoverId>, StorageError> {
        Ok(self
            .lock()
            .handovers
            .values()
            .filter(|h| &h.shift == shift)
            .map(|h| h.id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        PatientRef, Priority, ReplicaId, TaskPayload, TaskStatus, VersionedRecord, WallClock,
    };

    fn task_record(wall: u64) -> TaskRecord {
        let version = CausalVersion::first(ReplicaId::parse("server").unwrap(), WallClock::new(wall));
        VersionedRecord::new(
            TaskPayload {
                handover: HandoverId::parse("hov-1").unwrap(),
                patient: PatientRef::new("pat-1").unwrap(),
                title: "obs round".into(),
                note: None,
                status: TaskStatus::Pending,
                priority: Priority::Routine,
            },
            version,
        )
    }

    #[test]
    fn create_then_load_round_trips() {
        let store = MemoryStore::new();
        let id = TaskId::parse("tsk-1").unwrap();
        let record = task_record(10);
        store.save_task(&id, None, record.clone()).unwrap();
        assert_eq!(store.load_task(&id).unwrap(), record);
    }

    #[test]
    fn create_over_existing_is_stale() {
        let store = MemoryStore::new();
        let id = TaskId::parse("tsk-1").unwrap();
        store.save_task(&id, None, task_record(10)).unwrap();
        let err = store.save_task(&id, None, task_record(20)).unwrap_err();
        assert!(matches!(err, StorageError::StaleWrite { .. }));
    }

    #[test]
    fn cas_rejects_mismatched_version() {
        let store = MemoryStore::new();
        let id = TaskId::parse("tsk-1").unwrap();
        let first = task_record(10);
        store.save_task(&id, None, first.clone()).unwrap();

        let mut updated = first.clone();
        updated.version = first.version.advance(WallClock::new(20));
        store
            .save_task(&id, Some(&first.version), updated.clone())
            .unwrap();

        // Second writer still holding the old version loses.
        let err = store
            .save_task(&id, Some(&first.version), updated.clone())
            .unwrap_err();
        assert!(matches!(err, StorageError::StaleWrite { .. }));
        assert_eq!(err.transience(), Transience::Retryable);
    }

    #[test]
    fn list_by_shift_filters() {
        let store = MemoryStore::new();
        let version = CausalVersion::first(ReplicaId::parse("server").unwrap(), WallClock::new(1));
        let night = ShiftId::new("night").unwrap();
        let day = ShiftId::new("day").unwrap();
        store
            .save_handover(
                None,
                Handover::open(HandoverId::parse("hov-1").unwrap(), night.clone(), version.clone()),
            )
            .unwrap();
        store
            .save_handover(
                None,
                Handover::open(HandoverId::parse("hov-2").unwrap(), day, version),
            )
            .unwrap();

        let ids = store.list_by_shift(&night).unwrap();
        assert_eq!(ids, vec![HandoverId::parse("hov-1").unwrap()]);
    }
}
