//! Synchronization orchestrator and its collaborator seams
//!
//! - storage: keyed load/save with compare-and-swap on causal versions
//! - broadcast: change notices for other replicas to pull
//! - orchestrator: the single write path (stamp, verify, merge, commit)
//! - error: the caller-facing failure taxonomy

pub mod broadcast;
pub mod error;
pub mod orchestrator;
pub mod storage;

pub use broadcast::{ChangeNotice, ChangeNotifier, ChannelNotifier, NullNotifier};
pub use error::SyncError;
pub use orchestrator::{Orchestrator, TargetStatus, TransitionOutcome};
pub use storage::{MemoryStore, Storage, StorageError};
