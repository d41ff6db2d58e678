#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod sync;
pub mod telemetry;
pub mod verify;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    ActorId, Causality, CausalVersion, CoreError, EntityId, Handover, HandoverId, HandoverStatus,
    InvalidTransition, MergePolicy, PatientRef, Priority, ReplicaId, ShiftId, TaskId, TaskPayload,
    TaskRecord, TaskStatus, VersionedRecord, WallClock, merge,
};
pub use crate::sync::{
    ChangeNotice, ChangeNotifier, MemoryStore, Orchestrator, Storage, StorageError, SyncError,
};
pub use crate::sync::orchestrator::{TargetStatus, TransitionOutcome};
pub use crate::verify::{
    BreakerState, EntityFacts, EntityRef, FetchError, FieldMismatch, GateConfig, InvalidReason,
    SourceKind, UpstreamSource, VerificationGate, VerificationResult,
};
