//! Circuit breaker per upstream target.
//!
//! Explicit state machine: `Closed -> Open -> HalfOpen`. Opens after a
//! configurable run of consecutive failures, short-circuits while open, and
//! half-opens after a cool-down to probe recovery. Time comes from an
//! injected clock so tests never wait on real delay.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Millisecond clock abstraction.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock backed clock for production use.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Hand-advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, delta_ms: u64) {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// How long the breaker stays open before probing.
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_ms: 30_000,
        }
    }
}

/// Per-upstream circuit breaker.
///
/// Interior mutability: one breaker is shared by every verification call
/// that targets its upstream.
pub struct CircuitBreaker {
    target: &'static str,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at_ms: u64,
}

impl CircuitBreaker {
    pub fn new(target: &'static str, config: BreakerConfig) -> Self {
        Self {
            target,
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at_ms: 0,
            }),
        }
    }

    /// Whether a call may proceed now. Moves `Open -> HalfOpen` once the
    /// cool-down has elapsed.
    pub fn allow(&self, now_ms: u64) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if now_ms >= inner.opened_at_ms + self.config.cooldown_ms {
                    inner.state = BreakerState::HalfOpen;
                    debug!(target = self.target, "circuit half-open, probing");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            debug!(target = self.target, "circuit closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
    }

    pub fn record_failure(&self, now_ms: u64) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        let tripped = inner.state == BreakerState::HalfOpen
            || inner.consecutive_failures >= self.config.failure_threshold;
        if tripped && inner.state != BreakerState::Open {
            inner.state = BreakerState::Open;
            inner.opened_at_ms = now_ms;
            debug!(
                target = self.target,
                failures = inner.consecutive_failures,
                "circuit open"
            );
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        // Breaker state is plain data; a poisoned lock only means another
        // thread panicked mid-update, which cannot corrupt these fields.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "fhir",
            BreakerConfig {
                failure_threshold: 3,
                cooldown_ms: 1_000,
            },
        )
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let b = breaker();
        b.record_failure(10);
        b.record_failure(20);
        assert_eq!(b.state(), BreakerState::Closed);
        b.record_failure(30);
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow(31));
    }

    #[test]
    fn success_resets_failure_run() {
        let b = breaker();
        b.record_failure(10);
        b.record_failure(20);
        b.record_success();
        b.record_failure(30);
        b.record_failure(40);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn half_opens_after_cooldown() {
        let b = breaker();
        for t in [10, 20, 30] {
            b.record_failure(t);
        }
        assert!(!b.allow(500));
        assert!(b.allow(1_030));
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let b = breaker();
        for t in [10, 20, 30] {
            b.record_failure(t);
        }
        assert!(b.allow(1_050));
        b.record_failure(1_060);
        assert_eq!(b.state(), BreakerState::Open);
        // Cool-down restarts from the reopen.
        assert!(!b.allow(1_100));
        assert!(b.allow(2_070));
    }

    #[test]
    fn half_open_probe_success_closes() {
        let b = breaker();
        for t in [10, 20, 30] {
            b.record_failure(t);
        }
        assert!(b.allow(1_050));
        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allow(1_060));
    }

    #[test]
    fn manual_clock_advances() {
        let c = ManualClock::new(100);
        assert_eq!(c.now_ms(), 100);
        c.advance(50);
        assert_eq!(c.now_ms(), 150);
    }
}
