//! Tracing subscriber setup for the host binary.

use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter.
pub const LOG_ENV: &str = "HEARTH_LOG";

/// Initialize the global tracing subscriber.
///
/// Filter resolution order: explicit `filter` argument, then the
/// `HEARTH_LOG` environment variable, then `info`. Safe to call more than
/// once; subsequent calls are no-ops (relevant for tests sharing a process).
pub fn init_logging(filter: Option<&str>) {
    let env_filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
