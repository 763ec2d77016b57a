//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a global `fmt` subscriber. `RUST_LOG` wins over the configured level.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .is_ok()
}
