//! Structured logs, metrics and traces.
//!
//! Logging policy: stderr only, JSON lines, structured fields. Stdout is
//! reserved for the assistant's context channel.

pub mod activity;
pub mod metrics;
pub mod trace;

use tracing_subscriber::EnvFilter;

/// Install the process-wide JSON subscriber on stderr. Safe to call more
/// than once; later calls are no-ops.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
