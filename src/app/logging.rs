//! Logging initialization

use super::config::AppConfig;
use tracing::debug;

/// Initialize tracing for the process. `RUST_LOG` overrides the
/// verbosity-derived default.
pub fn init_logging(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.verbose >= 2)
        .init();

    debug!("autodrive started with verbosity level {}", config.verbose);
}
