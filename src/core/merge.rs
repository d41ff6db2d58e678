//! Layer 4: Merge engine
//!
//! Resolves two versioned records for the same logical entity into one
//! canonical record. Total function: it never fails, it only decides.
//!
//! 1. If one version causally dominates, that record wins outright.
//! 2. If concurrent, the configured policy decides. Default is
//!    last-writer-wins by wall clock, ties broken by the lexicographically
//!    larger replica id - a deterministic total order.
//! 3. A concurrent merge stamps the output with `observe(winner, loser)`,
//!    so the result dominates both inputs and re-merging either ancestor
//!    is a no-op.
//! 4. Tombstones win when causally equal; resurrection requires a strictly
//!    newer edit.

use serde::{Deserialize, Serialize};

use super::record::VersionedRecord;
use super::time::WallClock;
use super::version::Causality;

/// Policy applied when two edits are concurrent.
///
/// Task fields are coarse-grained, so whole-record replacement keeps merge
/// behavior predictable and auditable. Field-level CRDT merging is a
/// deliberate non-feature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    #[default]
    LwwByWallClock,
}

/// Merge `local` and `incoming` into the canonical record.
///
/// Commutative and idempotent; the concurrent branch is deterministic under
/// every policy.
pub fn merge<T: Clone>(
    local: &VersionedRecord<T>,
    incoming: &VersionedRecord<T>,
    policy: MergePolicy,
) -> VersionedRecord<T> {
    match local.version.compare(&incoming.version) {
        Causality::After => local.clone(),
        Causality::Before => incoming.clone(),
        Causality::Equal => {
            // Same snapshot. A tombstone at an equal version still wins:
            // deletion is never overridden implicitly.
            if incoming.tombstone && !local.tombstone {
                incoming.clone()
            } else {
                local.clone()
            }
        }
        Causality::Concurrent => {
            let (winner, loser) = match policy {
                MergePolicy::LwwByWallClock => pick_lww(local, incoming),
            };
            let wall = winner.version.wall.max(loser.version.wall);
            let version = winner.version.observe(&loser.version, wall);
            VersionedRecord {
                payload: winner.payload.clone(),
                version,
                tombstone: winner.tombstone,
            }
        }
    }
}

/// LWW total order: higher wall clock wins; on an exact tie the
/// lexicographically larger replica id wins.
fn pick_lww<'a, T>(
    a: &'a VersionedRecord<T>,
    b: &'a VersionedRecord<T>,
) -> (&'a VersionedRecord<T>, &'a VersionedRecord<T>) {
    let key = |r: &'a VersionedRecord<T>| (r.version.wall, r.version.replica.clone());
    if key(a) >= key(b) { (a, b) } else { (b, a) }
}
