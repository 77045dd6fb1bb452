//! Tracing initialization for the sitrep binaries.
//!
//! Filtering defaults to `info` and can be overridden with the `SITREP_LOG`
//! environment variable (standard env-filter syntax).

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global subscriber. Safe to call once per process.
pub fn init_tracing(default_level: Level) {
    let filter = EnvFilter::try_from_env("SITREP_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
