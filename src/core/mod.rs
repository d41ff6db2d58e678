//! Core domain types for shift synchronization (Layers 0-5)
//!
//! Module hierarchy follows type dependency order:
//! - time: WallClock (Layer 0)
//! - identity: ReplicaId, ActorId, TaskId, HandoverId, ShiftId (Layer 1)
//! - version: CausalVersion vector clock (Layer 2)
//! - record: VersionedRecord, TaskPayload (Layer 3)
//! - merge: merge engine + policy (Layer 4)
//! - handover: Handover aggregate + status table (Layer 5)

pub mod error;
pub mod handover;
pub mod identity;
pub mod merge;
pub mod record;
pub mod time;
pub mod version;

pub use error::{CoreError, InvalidId, InvalidStatus, InvalidTransition};
pub use handover::{Handover, HandoverStatus};
pub use identity::{ActorId, EntityId, HandoverId, PatientRef, ReplicaId, ShiftId, TaskId};
pub use merge::{MergePolicy, merge};
pub use record::{Priority, TaskPayload, TaskRecord, TaskStatus, VersionedRecord};
pub use time::WallClock;
pub use version::{Causality, CausalVersion};
