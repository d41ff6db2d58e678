//! Dual-protocol verification gate
//!
//! Confirms a record's clinical state against two independently-addressable
//! upstream systems before the orchestrator commits a trust-requiring
//! transition. Pure service: holds breaker state per upstream, no record
//! state.
//!
//! - source: upstream capability trait + protocol tags
//! - breaker: per-target circuit breaker (Closed -> Open -> HalfOpen)
//! - retry: bounded exponential backoff, transient-only
//! - gate: concurrent dual probe + reconciliation
//! - result: VerificationResult with degraded-source audit fields

pub mod breaker;
pub mod gate;
pub mod result;
pub mod retry;
pub mod source;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker, Clock, ManualClock, SystemClock};
pub use gate::{GateConfig, VerificationGate};
pub use result::{FieldMismatch, InvalidReason, VerificationResult};
pub use retry::{NoopSleeper, RetryPolicy, Sleeper, SystemSleeper};
pub use source::{EntityFacts, EntityRef, FetchError, SourceKind, UpstreamSource};
