use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::core::ReplicaId;

use super::schema::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Load configuration from a TOML file, then apply environment overrides.
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    let mut config = if path.exists() {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Environment always wins over the file layer.
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(raw) = std::env::var("SHIFTSYNC_REPLICA") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            match ReplicaId::parse(trimmed) {
                Ok(replica) => config.replica.replica = Some(replica),
                Err(err) => {
                    tracing::warn!("invalid SHIFTSYNC_REPLICA, ignoring: {err}");
                }
            }
        }
    }

    if let Ok(raw) = std::env::var("SHIFTSYNC_LOG") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            config.logging.filter = Some(trimmed.to_string());
        }
    }

    if let Ok(raw) = std::env::var("SHIFTSYNC_SOURCE_TIMEOUT_MS") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            match trimmed.parse::<u64>() {
                Ok(value) => config.verify.source_timeout_ms = value,
                Err(err) => {
                    tracing::warn!("invalid SHIFTSYNC_SOURCE_TIMEOUT_MS, ignoring: {err}");
                }
            }
        }
    }

    if let Ok(raw) = std::env::var("SHIFTSYNC_BREAKER_COOLDOWN_MS") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            match trimmed.parse::<u64>() {
                Ok(value) => config.verify.breaker_cooldown_ms = value,
                Err(err) => {
                    tracing::warn!("invalid SHIFTSYNC_BREAKER_COOLDOWN_MS, ignoring: {err}");
                }
            }
        }
    }
}
