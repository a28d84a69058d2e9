//! Subscriber set-up
//!
//! Logs go to stderr: the worker's stdout carries the wire protocol, and the
//! harness reserves stdout for mismatch and timing lines.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber; fails if one is already installed
pub fn try_init() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
}

/// Install the global subscriber unless one is already installed
pub fn init() {
    if let Err(e) = try_init() {
        tracing::debug!(error = %e, "keeping the existing subscriber");
    }
}
