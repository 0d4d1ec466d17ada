//! Structured logging setup. `RUST_LOG` (via `EnvFilter`) controls
//! verbosity; defaults to `info` when unset.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Call once, before any other
/// module logs.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
