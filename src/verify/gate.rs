//! Dual-protocol verification gate.
//!
//! One `verify` call probes both upstream channels concurrently, each probe
//! individually wrapped in bounded retry and a per-target circuit breaker,
//! then reconciles whatever came back:
//!
//! - both answered: cross-check identity fields; any discrepancy is a hard
//!   mismatch, never retried
//! - one answered: valid but degraded - a single silent channel must not
//!   stall clinical workflow
//! - neither answered: invalid with reason `Unavailable`, distinct from
//!   `Mismatch` so callers can apply different escalation policy

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel;
use tracing::{debug, warn};

use crate::core::WallClock;

use super::breaker::{BreakerConfig, BreakerState, CircuitBreaker, Clock, SystemClock};
use super::result::{FieldMismatch, VerificationResult};
use super::retry::{RetryPolicy, Sleeper, SystemSleeper, run_with_retry};
use super::source::{EntityFacts, EntityRef, SourceKind, UpstreamSource};

/// Tuning for one gate instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateConfig {
    /// Budget handed to each single upstream fetch.
    pub source_timeout: Duration,
    /// Overall deadline for one `verify` call, covering retries. A probe
    /// that misses it counts as unreachable.
    pub call_budget: Duration,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_millis(2_000),
            call_budget: Duration::from_millis(15_000),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

struct Slot {
    source: Arc<dyn UpstreamSource>,
    breaker: CircuitBreaker,
}

enum Probe {
    Answered(EntityFacts),
    Unreachable,
}

/// The gate. Holds no record state: it decides, the orchestrator commits.
pub struct VerificationGate {
    slots: Vec<Arc<Slot>>,
    config: GateConfig,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
}

impl VerificationGate {
    /// Gate over the two statically configured upstream channels.
    pub fn new(
        fhir: Arc<dyn UpstreamSource>,
        hl7: Arc<dyn UpstreamSource>,
        config: GateConfig,
    ) -> Self {
        Self::with_parts(fhir, hl7, config, Arc::new(SystemClock), Arc::new(SystemSleeper))
    }

    /// Full constructor with injected clock and sleeper (tests).
    pub fn with_parts(
        fhir: Arc<dyn UpstreamSource>,
        hl7: Arc<dyn UpstreamSource>,
        config: GateConfig,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let slot = |source: Arc<dyn UpstreamSource>| {
            let target = source.kind().as_str();
            Arc::new(Slot {
                source,
                breaker: CircuitBreaker::new(target, config.breaker),
            })
        };
        Self {
            slots: vec![slot(fhir), slot(hl7)],
            config,
            clock,
            sleeper,
        }
    }

    /// Current breaker state for an upstream channel.
    pub fn breaker_state(&self, kind: SourceKind) -> Option<BreakerState> {
        self.slots
            .iter()
            .find(|s| s.source.kind() == kind)
            .map(|s| s.breaker.state())
    }

    /// Confirm `entity` against both channels and reconcile.
    ///
    /// Total: every failure mode folds into the result, nothing panics or
    /// blocks past the call budget.
    pub fn verify(&self, entity: &EntityRef) -> VerificationResult {
        let deadline = Instant::now() + self.config.call_budget;
        let (tx, rx) = channel::bounded(self.slots.len());

        for slot in &self.slots {
            let slot = Arc::clone(slot);
            let tx = tx.clone();
            let entity = entity.clone();
            let config = self.config;
            let clock = Arc::clone(&self.clock);
            let sleeper = Arc::clone(&self.sleeper);
            std::thread::spawn(move || {
                let outcome = probe(&slot, &entity, &config, clock.as_ref(), sleeper.as_ref());
                // Receiver may have given up at the deadline; that is fine.
                let _ = tx.send((slot.source.kind(), outcome));
            });
        }
        drop(tx);

        let mut outcomes: BTreeMap<SourceKind, Probe> = BTreeMap::new();
        while outcomes.len() < self.slots.len() {
            match rx.recv_deadline(deadline) {
                Ok((kind, outcome)) => {
                    outcomes.insert(kind, outcome);
                }
                Err(_) => break,
            }
        }

        let checked_at = WallClock::new(self.clock.now_ms());
        let mut answered: Vec<(SourceKind, EntityFacts)> = Vec::new();
        for (kind, outcome) in outcomes {
            if let Probe::Answered(facts) = outcome {
                answered.push((kind, facts));
            }
        }

        let sources: Vec<SourceKind> = answered.iter().map(|(k, _)| *k).collect();
        match answered.len() {
            0 => {
                warn!(entity = %entity.entity, "both upstream channels unavailable");
                VerificationResult::unavailable(checked_at)
            }
            n => {
                let mismatches = cross_check(entity, &answered);
                if !mismatches.is_empty() {
                    warn!(
                        entity = %entity.entity,
                        fields = mismatches.len(),
                        "verification mismatch"
                    );
                    return VerificationResult::mismatched(mismatches, sources, checked_at);
                }
                let degraded = n < self.slots.len();
                if degraded {
                    debug!(entity = %entity.entity, sources = ?sources, "degraded confirmation");
                }
                VerificationResult::confirmed(sources, degraded, checked_at)
            }
        }
    }
}

fn probe(
    slot: &Slot,
    entity: &EntityRef,
    config: &GateConfig,
    clock: &dyn Clock,
    sleeper: &dyn Sleeper,
) -> Probe {
    let target = slot.source.kind().as_str();
    if !slot.breaker.allow(clock.now_ms()) {
        debug!(target, "circuit open, skipping upstream");
        return Probe::Unreachable;
    }
    match run_with_retry(&config.retry, sleeper, target, || {
        slot.source.fetch_entity(entity, config.source_timeout)
    }) {
        Ok(facts) => {
            slot.breaker.record_success();
            Probe::Answered(facts)
        }
        Err(err) => {
            slot.breaker.record_failure(clock.now_ms());
            warn!(target, error = %err, "upstream unreachable");
            Probe::Unreachable
        }
    }
}

/// Compare each answering channel against the local record's identity
/// fields. Any disagreement - with the record or between channels - lands
/// in the mismatch list.
fn cross_check(entity: &EntityRef, answered: &[(SourceKind, EntityFacts)]) -> Vec<FieldMismatch> {
    let mut mismatches = Vec::new();

    let patient_expected = entity.patient.as_str();
    let patients: BTreeMap<SourceKind, String> = answered
        .iter()
        .map(|(k, f)| (*k, f.patient.as_str().to_string()))
        .collect();
    if patients.values().any(|v| v != patient_expected) {
        mismatches.push(FieldMismatch {
            field: "patient".into(),
            expected: patient_expected.to_string(),
            observed: patients,
        });
    }

    let statuses: BTreeMap<SourceKind, String> = answered
        .iter()
        .map(|(k, f)| (*k, f.status.clone()))
        .collect();
    if statuses.values().any(|v| v != &entity.status) {
        mismatches.push(FieldMismatch {
            field: "status".into(),
            expected: entity.status.clone(),
            observed: statuses,
        });
    }

    mismatches
}
