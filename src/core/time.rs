//! Layer 0: Time primitives
//!
//! WallClock is advisory: it breaks ties between concurrent edits under the
//! LWW merge policy. It never establishes causality - that is the job of
//! `CausalVersion`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds since the Unix epoch.
///
/// Total order is well-defined but only advisory; replicas may skew.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WallClock(u64);

impl WallClock {
    pub fn new(ms: u64) -> Self {
        Self(ms)
    }

    /// Current wall time. Clamps to zero if the system clock is before epoch.
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_millis() {
        assert!(WallClock::new(10) < WallClock::new(11));
        assert_eq!(WallClock::new(7), WallClock::new(7));
    }

    #[test]
    fn now_is_nonzero() {
        assert!(WallClock::now().as_millis() > 0);
    }
}
