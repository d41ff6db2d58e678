//! Layer 2: Causal versions
//!
//! A `CausalVersion` is a per-replica counter plus a dependency snapshot (a
//! vector clock). It orders edits, or detects that they are concurrent,
//! without any shared clock.
//!
//! Invariants:
//! - a replica only ever increments its own counter
//! - no counter ever decreases
//! - `deps` holds the last counter observed per replica, including this
//!   replica's own entry (`deps[replica] == counter`)
//!
//! All operations are pure and deterministic; there are no error conditions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::identity::ReplicaId;
use super::time::WallClock;

/// Outcome of comparing two causal versions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Causality {
    /// Left happened strictly before right.
    Before,
    /// Left happened strictly after right.
    After,
    /// Neither dominates: independent edits on disconnected replicas.
    Concurrent,
    /// Identical dependency snapshots.
    Equal,
}

/// Causal version stamp carried by every mutable record.
///
/// `wall` is advisory only: it feeds the LWW tie-break for concurrent edits
/// and never participates in causality.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalVersion {
    pub replica: ReplicaId,
    pub counter: u64,
    pub wall: WallClock,
    pub deps: BTreeMap<ReplicaId, u64>,
}

impl CausalVersion {
    /// First version stamped by `replica` for a freshly created record.
    pub fn first(replica: ReplicaId, wall: WallClock) -> Self {
        let mut deps = BTreeMap::new();
        deps.insert(replica.clone(), 1);
        Self {
            replica,
            counter: 1,
            wall,
            deps,
        }
    }

    /// New version with this replica's counter incremented.
    ///
    /// Entries for other replicas are unchanged.
    pub fn advance(&self, wall: WallClock) -> Self {
        let counter = self.counter + 1;
        let mut deps = self.deps.clone();
        deps.insert(self.replica.clone(), counter);
        Self {
            replica: self.replica.clone(),
            counter,
            wall,
            deps,
        }
    }

    /// New version that has observed `remote`: dependencies are the
    /// pointwise maximum of both snapshots, and this replica's counter is
    /// incremented past both.
    pub fn observe(&self, remote: &CausalVersion, wall: WallClock) -> Self {
        let mut deps = self.deps.clone();
        for (replica, counter) in &remote.deps {
            let entry = deps.entry(replica.clone()).or_insert(0);
            *entry = (*entry).max(*counter);
        }
        let counter = self
            .counter
            .max(deps.get(&self.replica).copied().unwrap_or(0))
            + 1;
        deps.insert(self.replica.clone(), counter);
        Self {
            replica: self.replica.clone(),
            counter,
            wall,
            deps,
        }
    }

    /// Version for an edit made by `replica` on top of this stored version.
    ///
    /// Used by the orchestrator to stamp a proposed edit: the editing replica
    /// has observed everything in the stored snapshot, then advances its own
    /// counter.
    pub fn next_for(&self, replica: &ReplicaId, wall: WallClock) -> Self {
        let mut deps = self.deps.clone();
        let counter = deps.get(replica).copied().unwrap_or(0) + 1;
        deps.insert(replica.clone(), counter);
        Self {
            replica: replica.clone(),
            counter,
            wall,
            deps,
        }
    }

    /// Compare two versions by their dependency snapshots, pointwise.
    pub fn compare(&self, other: &CausalVersion) -> Causality {
        let mut less = false;
        let mut greater = false;
        for replica in self.deps.keys().chain(other.deps.keys()) {
            let a = self.deps.get(replica).copied().unwrap_or(0);
            let b = other.deps.get(replica).copied().unwrap_or(0);
            if a < b {
                less = true;
            } else if a > b {
                greater = true;
            }
        }
        match (less, greater) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Before,
            (false, true) => Causality::After,
            (true, true) => Causality::Concurrent,
        }
    }

    /// True if this version causally dominates (or equals) `other`.
    pub fn dominates(&self, other: &CausalVersion) -> bool {
        matches!(self.compare(other), Causality::After | Causality::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(s: &str) -> ReplicaId {
        ReplicaId::parse(s).unwrap()
    }

    fn wall(ms: u64) -> WallClock {
        WallClock::new(ms)
    }

    #[test]
    fn first_is_equal_to_itself() {
        let v = CausalVersion::first(replica("x"), wall(1));
        assert_eq!(v.compare(&v), Causality::Equal);
    }

    #[test]
    fn advance_strictly_follows() {
        let v1 = CausalVersion::first(replica("x"), wall(1));
        let v2 = v1.advance(wall(2));
        assert_eq!(v1.compare(&v2), Causality::Before);
        assert_eq!(v2.compare(&v1), Causality::After);
        assert_eq!(v2.counter, 2);
        assert_eq!(v2.deps.get(&replica("x")), Some(&2));
    }

    #[test]
    fn independent_edits_are_concurrent() {
        let x = CausalVersion::first(replica("x"), wall(1));
        let y = CausalVersion::first(replica("y"), wall(2));
        assert_eq!(x.compare(&y), Causality::Concurrent);
        assert_eq!(y.compare(&x), Causality::Concurrent);
    }

    #[test]
    fn observe_dominates_both_inputs() {
        let x = CausalVersion::first(replica("x"), wall(1));
        let y = CausalVersion::first(replica("y"), wall(2));
        let merged = y.observe(&x, wall(3));
        assert_eq!(merged.compare(&x), Causality::After);
        assert_eq!(merged.compare(&y), Causality::After);
        assert_eq!(merged.deps.get(&replica("x")), Some(&1));
        assert_eq!(merged.replica, replica("y"));
    }

    #[test]
    fn observe_takes_pointwise_max() {
        let x = CausalVersion::first(replica("x"), wall(1));
        let x3 = x.advance(wall(2)).advance(wall(3));
        let y = CausalVersion::first(replica("y"), wall(2));
        let merged = y.observe(&x3, wall(4));
        assert_eq!(merged.deps.get(&replica("x")), Some(&3));
        assert_eq!(merged.deps.get(&replica("y")), Some(&2));
    }

    #[test]
    fn next_for_builds_on_stored_snapshot() {
        let stored = CausalVersion::first(replica("server"), wall(1));
        let edit = stored.next_for(&replica("tablet"), wall(2));
        assert_eq!(edit.replica, replica("tablet"));
        assert_eq!(edit.counter, 1);
        assert_eq!(edit.compare(&stored), Causality::After);

        let second = edit.next_for(&replica("tablet"), wall(3));
        assert_eq!(second.counter, 2);
        assert_eq!(second.compare(&edit), Causality::After);
    }

    #[test]
    fn counters_never_decrease_through_observe() {
        let x = CausalVersion::first(replica("x"), wall(1));
        let y = CausalVersion::first(replica("y"), wall(1));
        let m1 = x.observe(&y, wall(2));
        let m2 = m1.observe(&y, wall(3));
        for (r, c) in &m1.deps {
            assert!(m2.deps.get(r).copied().unwrap_or(0) >= *c);
        }
    }
}
