//! Change notifications for other replicas.
//!
//! After a successful merge the orchestrator emits `{entity, new version}`
//! so replicas know to pull. Delivery semantics (at-least-once) belong to
//! the transport collaborator; the engine only hands the notice over and
//! never blocks a commit on a slow consumer.

use crossbeam::channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{CausalVersion, EntityId};

/// One committed change, the pull point for other replicas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub entity: EntityId,
    pub version: CausalVersion,
}

/// Transport seam. Implementations must not block.
pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, notice: ChangeNotice);
}

/// Notifier that drops notices on the floor (embedders without replication).
#[derive(Debug, Default)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn notify(&self, _notice: ChangeNotice) {}
}

/// Bounded channel fan-out. Full buffer drops the notice with a warning:
/// a lost notice delays a pull, it never corrupts state.
pub struct ChannelNotifier {
    tx: Sender<ChangeNotice>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, Receiver<ChangeNotice>) {
        let (tx, rx) = crossbeam::channel::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl ChangeNotifier for ChannelNotifier {
    fn notify(&self, notice: ChangeNotice) {
        match self.tx.try_send(notice) {
            Ok(()) => {}
            Err(TrySendError::Full(notice)) => {
                warn!(entity = %notice.entity, "notice buffer full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
