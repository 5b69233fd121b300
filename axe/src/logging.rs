//! Process-wide `tracing` subscriber setup.

use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "AXE_LOG";

/// Installs a compact stderr subscriber. The filter comes from `AXE_LOG`, then `RUST_LOG`, then
/// `default_filter`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .is_ok()
}
