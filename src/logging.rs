//! Logging setup for the binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is left to
//! the process entry point.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over the configured level. Calling this twice is harmless;
/// the second installation attempt is ignored.
pub fn init(config: &LoggingConfig, debug: bool) {
    let fallback = if debug { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
