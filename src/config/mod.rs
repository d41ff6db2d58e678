//! Configuration: serde schema with defaults, TOML file layer, environment
//! overrides (`SHIFTSYNC_*`).

mod load;
mod schema;

pub use load::{ConfigError, apply_env_overrides, load_from_path};
pub use schema::{Config, LogFormat, LoggingConfig, ReplicaConfig, VerifyConfig};
