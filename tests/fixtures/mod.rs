//! Shared fixtures: scriptable upstream sources, a contended storage
//! wrapper, and builders for records and orchestrators.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crossbeam::channel::Receiver;

use shiftsync::core::{
    ActorId, CausalVersion, HandoverId, PatientRef, Priority, ReplicaId, ShiftId, TaskId,
    TaskPayload, TaskRecord, TaskStatus, VersionedRecord, WallClock,
};
use shiftsync::sync::{ChangeNotice, ChannelNotifier, MemoryStore, Orchestrator, Storage, StorageError};
use shiftsync::verify::{
    Clock, EntityFacts, EntityRef, FetchError, GateConfig, ManualClock, NoopSleeper, RetryPolicy,
    SourceKind, UpstreamSource, VerificationGate,
};
use shiftsync::core::Handover;

pub type FetchResult = Result<EntityFacts, FetchError>;

/// Upstream double driven by a closure, so behavior can vary per entity.
pub struct FnSource {
    kind: SourceKind,
    respond: Box<dyn Fn(&EntityRef) -> FetchResult + Send + Sync>,
}

impl FnSource {
    pub fn new(
        kind: SourceKind,
        respond: impl Fn(&EntityRef) -> FetchResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            respond: Box::new(respond),
        })
    }

    /// Source that always confirms whatever it is asked about.
    pub fn confirming(kind: SourceKind) -> Arc<Self> {
        Self::new(kind, |entity| {
            Ok(EntityFacts {
                patient: entity.patient.clone(),
                status: entity.status.clone(),
                raw: None,
            })
        })
    }

    /// Source that is permanently unreachable.
    pub fn down(kind: SourceKind) -> Arc<Self> {
        Self::new(kind, |_| Err(FetchError::Transient("connection refused".into())))
    }
}

impl UpstreamSource for FnSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn fetch_entity(&self, entity: &EntityRef, _timeout: Duration) -> FetchResult {
        (self.respond)(entity)
    }
}

/// Storage wrapper that rejects the first `failures` task saves with
/// `StaleWrite`, to exercise the orchestrator's re-read-and-retry path.
pub struct ContendedStore {
    inner: MemoryStore,
    remaining: AtomicU32,
}

impl ContendedStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            remaining: AtomicU32::new(failures),
        }
    }

    fn contend(&self, id: &str) -> Result<(), StorageError> {
        let remaining = self.remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::StaleWrite { id: id.to_string() });
        }
        Ok(())
    }
}

impl Storage for ContendedStore {
    fn load_task(&self, id: &TaskId) -> Result<TaskRecord, StorageError> {
        self.inner.load_task(id)
    }

    fn save_task(
        &self,
        id: &TaskId,
        expected: Option<&CausalVersion>,
        record: TaskRecord,
    ) -> Result<(), StorageError> {
        // Creation is left alone; contention targets updates.
        if expected.is_some() {
            self.contend(id.as_str())?;
        }
        self.inner.save_task(id, expected, record)
    }

    fn load_handover(&self, id: &HandoverId) -> Result<Handover, StorageError> {
        self.inner.load_handover(id)
    }

    fn save_handover(
        &self,
        expected: Option<&CausalVersion>,
        handover: Handover,
    ) -> Result<(), StorageError> {
        self.inner.save_handover(expected, handover)
    }

    fn list_by_shift(&self, shift: &ShiftId) -> Result<Vec<HandoverId>, StorageError> {
        self.inner.list_by_shift(shift)
    }
}

pub fn replica(s: &str) -> ReplicaId {
    ReplicaId::parse(s).unwrap()
}

pub fn actor(s: &str) -> ActorId {
    ActorId::new(s).unwrap()
}

pub fn patient(s: &str) -> PatientRef {
    PatientRef::new(s).unwrap()
}

pub fn shift(s: &str) -> ShiftId {
    ShiftId::new(s).unwrap()
}

pub fn task_payload(handover: &HandoverId, patient_ref: &str, title: &str) -> TaskPayload {
    TaskPayload {
        handover: handover.clone(),
        patient: patient(patient_ref),
        title: title.to_string(),
        note: None,
        status: TaskStatus::Pending,
        priority: Priority::Routine,
    }
}

pub fn task_record(handover: &HandoverId, replica_id: &str, wall: u64) -> TaskRecord {
    VersionedRecord::new(
        task_payload(handover, "pat-1", "obs round"),
        CausalVersion::first(replica(replica_id), WallClock::new(wall)),
    )
}

/// Gate config that never sleeps between retries.
pub fn fast_gate_config() -> GateConfig {
    GateConfig {
        retry: RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
        },
        ..GateConfig::default()
    }
}

pub fn gate(
    fhir: Arc<dyn UpstreamSource>,
    hl7: Arc<dyn UpstreamSource>,
    clock: Arc<ManualClock>,
) -> VerificationGate {
    VerificationGate::with_parts(fhir, hl7, fast_gate_config(), clock, Arc::new(NoopSleeper))
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub notices: Receiver<ChangeNotice>,
    pub clock: Arc<ManualClock>,
}

/// Orchestrator over in-memory storage and the given upstream pair.
pub fn harness(fhir: Arc<dyn UpstreamSource>, hl7: Arc<dyn UpstreamSource>) -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()), fhir, hl7)
}

pub fn harness_with_store(
    store: Arc<dyn Storage>,
    fhir: Arc<dyn UpstreamSource>,
    hl7: Arc<dyn UpstreamSource>,
) -> Harness {
    let clock = Arc::new(ManualClock::new(1_000));
    let (notifier, notices) = ChannelNotifier::new(64);
    let orchestrator = Orchestrator::with_clock(
        store,
        Arc::new(notifier),
        gate(fhir, hl7, Arc::clone(&clock)),
        replica("server"),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    Harness {
        orchestrator,
        notices,
        clock,
    }
}
