//! Synchronization orchestrator.
//!
//! The only component that writes records. Every mutation follows the same
//! pipeline: stamp a causal version, gate trust-requiring transitions
//! through dual-protocol verification, merge against the stored record,
//! commit via compare-and-swap, broadcast the new version.
//!
//! Transitions are serialized per entity id; a lost CAS race is re-read and
//! retried exactly once before surfacing `StaleWrite`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Condvar, Mutex};

use tracing::{debug, info, warn};

use crate::core::{
    ActorId, CausalVersion, EntityId, Handover, HandoverId, HandoverStatus, InvalidTransition,
    MergePolicy, ReplicaId, ShiftId, TaskId, TaskPayload, TaskRecord, TaskStatus, VersionedRecord,
    WallClock, merge,
};
use crate::verify::{
    Clock, EntityRef, InvalidReason, SystemClock, VerificationGate, VerificationResult,
};

use super::broadcast::{ChangeNotice, ChangeNotifier};
use super::error::SyncError;
use super::storage::{Storage, StorageError};

/// Requested status for `request_transition`, typed per record kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetStatus {
    Task(TaskStatus),
    Handover(HandoverStatus),
}

/// Updated record returned by a successful transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    Task(TaskRecord),
    Handover(Handover),
}

/// One in-flight transition per entity id at a time; different entities
/// proceed independently.
#[derive(Default)]
struct EntityLocks {
    held: Mutex<BTreeSet<String>>,
    released: Condvar,
}

struct EntityGuard<'a> {
    locks: &'a EntityLocks,
    key: String,
}

impl EntityLocks {
    fn acquire(&self, key: &str) -> EntityGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        while held.contains(key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|e| e.into_inner());
        }
        held.insert(key.to_string());
        EntityGuard {
            locks: self,
            key: key.to_string(),
        }
    }
}

impl Drop for EntityGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        held.remove(&self.key);
        self.locks.released.notify_all();
    }
}

/// The orchestrator. Owns all writes to task records and handover
/// aggregates; merge engine and verification gate are invoked, never
/// stateful about records.
pub struct Orchestrator {
    store: Arc<dyn Storage>,
    notifier: Arc<dyn ChangeNotifier>,
    gate: VerificationGate,
    /// Replica identity this orchestrator stamps server-side mutations with.
    replica: ReplicaId,
    policy: MergePolicy,
    clock: Arc<dyn Clock>,
    locks: EntityLocks,
    last_verification: Mutex<BTreeMap<EntityId, VerificationResult>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Storage>,
        notifier: Arc<dyn ChangeNotifier>,
        gate: VerificationGate,
        replica: ReplicaId,
    ) -> Self {
        Self::with_clock(store, notifier, gate, replica, Arc::new(SystemClock))
    }

    /// Constructor with an injected clock (tests).
    pub fn with_clock(
        store: Arc<dyn Storage>,
        notifier: Arc<dyn ChangeNotifier>,
        gate: VerificationGate,
        replica: ReplicaId,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            gate,
            replica,
            policy: MergePolicy::default(),
            clock,
            locks: EntityLocks::default(),
            last_verification: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn now(&self) -> WallClock {
        WallClock::new(self.clock.now_ms())
    }

    // =========================================================================
    // Handover lifecycle
    // =========================================================================

    /// Open a handover at a shift boundary, in `Preparing`.
    pub fn open_handover(&self, shift: ShiftId) -> Result<Handover, SyncError> {
        let id = HandoverId::generate();
        let version = CausalVersion::first(self.replica.clone(), self.now());
        let handover = Handover::open(id.clone(), shift, version);
        self.store.save_handover(None, handover.clone())?;
        info!(handover = %id, shift = %handover.shift, "handover opened");
        self.notify(EntityId::Handover(id), handover.version.clone());
        Ok(handover)
    }

    /// Create a task inside its handover's task list.
    pub fn add_task(
        &self,
        payload: TaskPayload,
        replica: &ReplicaId,
    ) -> Result<(TaskId, TaskRecord), SyncError> {
        if payload.status.requires_verification() {
            return Err(SyncError::TrustRequired {
                entity: EntityId::Handover(payload.handover.clone()),
                status: payload.status.as_str(),
            });
        }
        let handover_id = payload.handover.clone();
        let _guard = self.locks.acquire(handover_id.as_str());

        let mut handover = self.load_handover(&handover_id)?;
        if handover.archived {
            return Err(SyncError::HandoverArchived {
                entity: EntityId::Handover(handover_id),
            });
        }

        let id = TaskId::generate();
        let record = VersionedRecord::new(
            payload,
            CausalVersion::first(replica.clone(), self.now()),
        );
        self.store.save_task(&id, None, record.clone())?;

        let expected = handover.version.clone();
        handover.tasks.insert(id.clone());
        handover.version = handover.version.advance(self.now());
        self.store.save_handover(Some(&expected), handover.clone())?;

        info!(task = %id, handover = %handover_id, "task added");
        self.notify(EntityId::Task(id.clone()), record.version.clone());
        self.notify(EntityId::Handover(handover_id), handover.version);
        Ok((id, record))
    }

    // =========================================================================
    // Caller-facing operation surface
    // =========================================================================

    /// Apply a replica's edit to a task. Plain edits are not verified;
    /// status changes into trust-requiring territory must go through
    /// `request_transition`.
    pub fn propose_edit(
        &self,
        id: &TaskId,
        payload: TaskPayload,
        replica: &ReplicaId,
    ) -> Result<TaskRecord, SyncError> {
        let entity = EntityId::Task(id.clone());
        let _guard = self.locks.acquire(id.as_str());

        let mut retried = false;
        loop {
            let stored = self.load_task(id)?;
            if payload.status != stored.payload.status && payload.status.requires_verification() {
                return Err(SyncError::TrustRequired {
                    entity,
                    status: payload.status.as_str(),
                });
            }

            let version = stored.version.next_for(replica, self.now());
            let incoming = VersionedRecord::new(payload.clone(), version);
            let merged = merge(&stored, &incoming, self.policy);

            match self.store.save_task(id, Some(&stored.version), merged.clone()) {
                Ok(()) => {
                    debug!(task = %id, replica = %replica, "edit committed");
                    self.notify(entity, merged.version.clone());
                    return Ok(merged);
                }
                Err(StorageError::StaleWrite { .. }) if !retried => {
                    retried = true;
                }
                Err(StorageError::StaleWrite { .. }) => {
                    return Err(SyncError::StaleWrite { entity });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Retract a task: a tombstone is an explicit, causally stamped edit.
    pub fn propose_removal(
        &self,
        id: &TaskId,
        replica: &ReplicaId,
    ) -> Result<TaskRecord, SyncError> {
        let entity = EntityId::Task(id.clone());
        let _guard = self.locks.acquire(id.as_str());

        let mut retried = false;
        loop {
            let stored = self.load_task(id)?;
            let version = stored.version.next_for(replica, self.now());
            let incoming = VersionedRecord::retracted(stored.payload.clone(), version);
            let merged = merge(&stored, &incoming, self.policy);

            match self.store.save_task(id, Some(&stored.version), merged.clone()) {
                Ok(()) => {
                    info!(task = %id, replica = %replica, "task retracted");
                    self.notify(entity, merged.version.clone());
                    return Ok(merged);
                }
                Err(StorageError::StaleWrite { .. }) if !retried => {
                    retried = true;
                }
                Err(StorageError::StaleWrite { .. }) => {
                    return Err(SyncError::StaleWrite { entity });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Merge a record that arrived from another replica's broadcast pull.
    ///
    /// Concurrent edits resolve through the merge policy; a record that
    /// changes nothing commits nothing.
    pub fn ingest_remote(&self, id: &TaskId, incoming: TaskRecord) -> Result<TaskRecord, SyncError> {
        let entity = EntityId::Task(id.clone());
        let _guard = self.locks.acquire(id.as_str());

        let mut retried = false;
        loop {
            let stored = match self.store.load_task(id) {
                Ok(stored) => stored,
                Err(StorageError::NotFound { .. }) => {
                    // First sight of a record created elsewhere.
                    self.store.save_task(id, None, incoming.clone())?;
                    self.notify(entity, incoming.version.clone());
                    return Ok(incoming);
                }
                Err(err) => return Err(err.into()),
            };

            let merged = merge(&stored, &incoming, self.policy);
            if merged == stored {
                return Ok(stored);
            }

            match self.store.save_task(id, Some(&stored.version), merged.clone()) {
                Ok(()) => {
                    debug!(task = %id, "remote record merged");
                    self.notify(entity, merged.version.clone());
                    return Ok(merged);
                }
                Err(StorageError::StaleWrite { .. }) if !retried => {
                    retried = true;
                }
                Err(StorageError::StaleWrite { .. }) => {
                    return Err(SyncError::StaleWrite { entity });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Request a lifecycle transition for a task or a handover.
    pub fn request_transition(
        &self,
        entity: &EntityId,
        target: TargetStatus,
        actor: &ActorId,
    ) -> Result<TransitionOutcome, SyncError> {
        match (entity, target) {
            (EntityId::Task(id), TargetStatus::Task(status)) => self
                .task_transition(id, status, actor)
                .map(TransitionOutcome::Task),
            (EntityId::Handover(id), TargetStatus::Handover(status)) => self
                .handover_transition(id, status, actor)
                .map(TransitionOutcome::Handover),
            (_, TargetStatus::Task(_)) => Err(SyncError::WrongEntityKind {
                entity: entity.clone(),
                expected: "task",
            }),
            (_, TargetStatus::Handover(_)) => Err(SyncError::WrongEntityKind {
                entity: entity.clone(),
                expected: "handover",
            }),
        }
    }

    /// Read a task record as stored.
    pub fn get_task(&self, id: &TaskId) -> Result<TaskRecord, SyncError> {
        self.load_task(id)
    }

    /// Read a handover aggregate as stored.
    pub fn get_handover(&self, id: &HandoverId) -> Result<Handover, SyncError> {
        self.load_handover(id)
    }

    /// Handovers opened for a shift.
    pub fn list_by_shift(&self, shift: &ShiftId) -> Result<Vec<HandoverId>, SyncError> {
        Ok(self.store.list_by_shift(shift)?)
    }

    /// Most recent verification outcome for an entity, if any.
    pub fn get_verification_status(&self, entity: &EntityId) -> Option<VerificationResult> {
        self.last_verification
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(entity)
            .cloned()
    }

    // =========================================================================
    // Transition internals
    // =========================================================================

    fn task_transition(
        &self,
        id: &TaskId,
        target: TaskStatus,
        actor: &ActorId,
    ) -> Result<TaskRecord, SyncError> {
        let entity = EntityId::Task(id.clone());
        let _guard = self.locks.acquire(id.as_str());

        let mut retried = false;
        loop {
            let stored = self.load_task(id)?;
            if stored.is_tombstone() {
                return Err(SyncError::NotFound { entity });
            }
            let from = stored.payload.status;
            if !from.can_transition_to(target) {
                return Err(InvalidTransition {
                    kind: "task",
                    from: from.as_str().to_string(),
                    to: target.as_str().to_string(),
                }
                .into());
            }

            // Stamp first, verify second, merge and commit only on trust.
            let version = stored.version.next_for(&self.replica, self.now());
            let mut payload = stored.payload.clone();
            payload.status = target;
            let candidate = VersionedRecord::new(payload, version);

            if target.requires_verification() {
                let result = self.verify_entity(&entity, &stored.payload, target.as_str());
                if !result.is_valid {
                    // Record left untouched; reason decides retry policy.
                    return Err(self.invalid_result_error(entity, result));
                }
            }

            let merged = merge(&stored, &candidate, self.policy);
            match self.store.save_task(id, Some(&stored.version), merged.clone()) {
                Ok(()) => {
                    info!(
                        task = %id,
                        actor = %actor,
                        from = from.as_str(),
                        to = target.as_str(),
                        "task transition committed"
                    );
                    if target.requires_verification() {
                        self.mark_task_verified(&stored.payload.handover, id);
                    }
                    self.notify(entity, merged.version.clone());
                    return Ok(merged);
                }
                Err(StorageError::StaleWrite { .. }) if !retried => {
                    retried = true;
                }
                Err(StorageError::StaleWrite { .. }) => {
                    return Err(SyncError::StaleWrite { entity });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn handover_transition(
        &self,
        id: &HandoverId,
        target: HandoverStatus,
        actor: &ActorId,
    ) -> Result<Handover, SyncError> {
        let entity = EntityId::Handover(id.clone());
        let _guard = self.locks.acquire(id.as_str());

        let mut retried = false;
        loop {
            let handover = self.load_handover(id)?;
            let from = handover.status;
            if !from.can_transition_to(target) {
                return Err(InvalidTransition {
                    kind: "handover",
                    from: from.as_str().to_string(),
                    to: target.as_str().to_string(),
                }
                .into());
            }

            if target.requires_verification() {
                if let Err(err) = self.verify_all_tasks(&handover) {
                    // All-or-nothing: no task changed, the aggregate rolls
                    // back to VerificationRequired for escalation.
                    self.park_for_verification(handover);
                    return Err(err);
                }
            }

            let expected = handover.version.clone();
            let mut updated = handover;
            updated.transition(target, self.now())?;

            match self.store.save_handover(Some(&expected), updated.clone()) {
                Ok(()) => {
                    info!(
                        handover = %id,
                        actor = %actor,
                        from = from.as_str(),
                        to = target.as_str(),
                        "handover transition committed"
                    );
                    self.notify(entity, updated.version.clone());
                    return Ok(updated);
                }
                Err(StorageError::StaleWrite { .. }) if !retried => {
                    retried = true;
                }
                Err(StorageError::StaleWrite { .. }) => {
                    return Err(SyncError::StaleWrite { entity });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Gate every constituent task that has not yet passed in the current
    /// window. First failure aborts the whole attempt.
    fn verify_all_tasks(&self, handover: &Handover) -> Result<(), SyncError> {
        let pending: Vec<TaskId> = handover.unverified_tasks().cloned().collect();
        for task_id in pending {
            let record = self.load_task(&task_id)?;
            if record.is_tombstone() {
                // Retired tasks carry no clinical state to confirm.
                continue;
            }
            let task_entity = EntityId::Task(task_id.clone());
            let result = self.verify_entity(
                &task_entity,
                &record.payload,
                record.payload.status.as_str(),
            );
            if !result.is_valid {
                warn!(
                    handover = %handover.id,
                    task = %task_id,
                    "constituent task failed verification, aborting completion"
                );
                return Err(self.invalid_result_error(task_entity, result));
            }
        }
        Ok(())
    }

    /// Roll a failed completion attempt back to `VerificationRequired`.
    /// Task records are untouched by design.
    fn park_for_verification(&self, handover: Handover) {
        if handover.status == HandoverStatus::VerificationRequired {
            return;
        }
        let expected = handover.version.clone();
        let mut parked = handover;
        match parked.transition(HandoverStatus::VerificationRequired, self.now()) {
            Ok(()) => {
                if let Err(err) = self.store.save_handover(Some(&expected), parked.clone()) {
                    warn!(handover = %parked.id, error = %err, "failed to park handover");
                } else {
                    self.notify(EntityId::Handover(parked.id.clone()), parked.version);
                }
            }
            Err(err) => {
                warn!(handover = %parked.id, error = %err, "cannot park handover");
            }
        }
    }

    fn verify_entity(
        &self,
        entity: &EntityId,
        payload: &TaskPayload,
        status: &str,
    ) -> VerificationResult {
        let result = self.gate.verify(&EntityRef {
            entity: entity.clone(),
            patient: payload.patient.clone(),
            status: status.to_string(),
        });
        self.last_verification
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entity.clone(), result.clone());
        result
    }

    fn invalid_result_error(&self, entity: EntityId, result: VerificationResult) -> SyncError {
        match result.reason {
            Some(InvalidReason::Unavailable) => SyncError::UpstreamUnavailable { entity, result },
            _ => SyncError::VerificationMismatch {
                entity,
                mismatches: result.mismatches.clone(),
                result,
            },
        }
    }

    /// Record a per-task verification pass in the aggregate's window.
    fn mark_task_verified(&self, handover_id: &HandoverId, task: &TaskId) {
        let _guard = self.locks.acquire(handover_id.as_str());
        let mut retried = false;
        loop {
            let mut handover = match self.load_handover(handover_id) {
                Ok(h) => h,
                Err(err) => {
                    warn!(handover = %handover_id, error = %err, "cannot record verification pass");
                    return;
                }
            };
            let expected = handover.version.clone();
            handover.mark_verified(task, self.now());
            if handover.version == expected {
                return;
            }
            match self.store.save_handover(Some(&expected), handover.clone()) {
                Ok(()) => {
                    self.notify(EntityId::Handover(handover_id.clone()), handover.version);
                    return;
                }
                Err(StorageError::StaleWrite { .. }) if !retried => {
                    retried = true;
                }
                Err(err) => {
                    warn!(handover = %handover_id, error = %err, "cannot record verification pass");
                    return;
                }
            }
        }
    }

    fn load_task(&self, id: &TaskId) -> Result<TaskRecord, SyncError> {
        self.store.load_task(id).map_err(|err| match err {
            StorageError::NotFound { .. } => SyncError::NotFound {
                entity: EntityId::Task(id.clone()),
            },
            other => other.into(),
        })
    }

    fn load_handover(&self, id: &HandoverId) -> Result<Handover, SyncError> {
        self.store.load_handover(id).map_err(|err| match err {
            StorageError::NotFound { .. } => SyncError::NotFound {
                entity: EntityId::Handover(id.clone()),
            },
            other => other.into(),
        })
    }

    fn notify(&self, entity: EntityId, version: CausalVersion) {
        self.notifier.notify(ChangeNotice { entity, version });
    }
}
