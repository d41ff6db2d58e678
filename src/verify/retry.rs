//! Bounded retry with exponential backoff.
//!
//! Only transient/network-class failures are retried; validation failures
//! surface immediately. Sleeping goes through an injected `Sleeper` so
//! tests run without real delay.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::source::FetchError;

/// Retry bounds. Delay for attempt `n` (0-based) is
/// `base * 2^n`, capped at `max_delay_ms`, plus up to 10% jitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 32_000,
        }
    }
}

impl RetryPolicy {
    /// Capped exponential delay before retrying after failed attempt
    /// `attempt` (0-based), without jitter.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.min(63);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(exponent).unwrap_or(u64::MAX));
        delay.min(self.max_delay_ms)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.delay_ms(attempt);
        let jitter = if base == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=base / 10)
        };
        Duration::from_millis(base + jitter)
    }
}

/// Sleep abstraction: tests inject a no-op.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default)]
pub struct SystemSleeper;

impl Sleeper for SystemSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Default)]
pub struct NoopSleeper;

impl Sleeper for NoopSleeper {
    fn sleep(&self, _duration: Duration) {}
}

/// Run `op` up to `policy.max_attempts` times, backing off between
/// transient failures. Terminal failures return on the spot.
pub fn run_with_retry<T>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    target: &'static str,
    mut op: impl FnMut() -> Result<T, FetchError>,
) -> Result<T, FetchError> {
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                debug!(target, attempt, error = %err, "transient upstream failure");
                if attempt + 1 < attempts {
                    sleeper.sleep(policy.delay_with_jitter(attempt));
                }
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    // attempts >= 1, so a transient error was recorded.
    Err(last_err.unwrap_or_else(|| FetchError::Transient("retry budget exhausted".into())))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 500,
            max_delay_ms: 32_000,
        };
        assert_eq!(policy.delay_ms(0), 500);
        assert_eq!(policy.delay_ms(1), 1_000);
        assert_eq!(policy.delay_ms(2), 2_000);
        assert_eq!(policy.delay_ms(6), 32_000);
        assert_eq!(policy.delay_ms(20), 32_000);
    }

    #[test]
    fn transient_failures_retry_up_to_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(
            &RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
            &NoopSleeper,
            "fhir",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Transient("down".into()))
            },
        );
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn terminal_failures_are_never_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(
            &RetryPolicy::default(),
            &NoopSleeper,
            "hl7",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Terminal("unknown patient".into()))
            },
        );
        assert!(matches!(result, Err(FetchError::Terminal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn success_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = run_with_retry(
            &RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 1,
            },
            &NoopSleeper,
            "fhir",
            || {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(FetchError::Transient("blip".into()))
                } else {
                    Ok(7)
                }
            },
        );
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
