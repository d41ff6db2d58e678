use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{ActorId, MergePolicy, ReplicaId};
use crate::verify::{BreakerConfig, GateConfig, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub replica: ReplicaConfig,
    pub verify: VerifyConfig,
    pub merge_policy: MergePolicy,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Identity this node stamps server-side mutations with.
    pub replica: Option<ReplicaId>,
    /// Default actor for operations that do not carry one.
    pub actor: Option<ActorId>,
}

/// Verification gate tuning. Defaults mirror the gate's own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub source_timeout_ms: u64,
    pub call_budget_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_ms: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        let gate = GateConfig::default();
        Self {
            source_timeout_ms: gate.source_timeout.as_millis() as u64,
            call_budget_ms: gate.call_budget.as_millis() as u64,
            retry_max_attempts: gate.retry.max_attempts,
            retry_base_delay_ms: gate.retry.base_delay_ms,
            retry_max_delay_ms: gate.retry.max_delay_ms,
            breaker_failure_threshold: gate.breaker.failure_threshold,
            breaker_cooldown_ms: gate.breaker.cooldown_ms,
        }
    }
}

impl VerifyConfig {
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            source_timeout: Duration::from_millis(self.source_timeout_ms),
            call_budget: Duration::from_millis(self.call_budget_ms),
            retry: RetryPolicy {
                max_attempts: self.retry_max_attempts,
                base_delay_ms: self.retry_base_delay_ms,
                max_delay_ms: self.retry_max_delay_ms,
            },
            breaker: BreakerConfig {
                failure_threshold: self.breaker_failure_threshold,
                cooldown_ms: self.breaker_cooldown_ms,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive, e.g. `shiftsync=debug`. RUST_LOG wins if set.
    pub filter: Option<String>,
    pub format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_gate_config() {
        let config = VerifyConfig::default();
        let gate = config.gate_config();
        assert_eq!(gate, GateConfig::default());
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.replica.replica.is_none());
        assert_eq!(config.verify.breaker_failure_threshold, 3);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config: Config = toml::from_str(
            r#"
            [replica]
            replica = "ward-3"

            [verify]
            breaker_cooldown_ms = 5000
            "#,
        )
        .unwrap();
        assert_eq!(
            config.replica.replica,
            Some(ReplicaId::parse("ward-3").unwrap())
        );
        assert_eq!(config.verify.breaker_cooldown_ms, 5_000);
        // Untouched fields keep defaults.
        assert_eq!(config.verify.retry_max_attempts, 3);
    }
}
