//! Tracing setup.
//!
//! `RUST_LOG` takes precedence, then the configured filter, then `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the global subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init(config: &LoggingConfig) {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(env) => EnvFilter::new(env),
        Err(_) => EnvFilter::new(config.filter.as_deref().unwrap_or("info")),
    };

    let registry = Registry::default().with(filter);
    let result = match config.format {
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    // Already initialized elsewhere (tests, embedding application).
    let _ = result;
}
