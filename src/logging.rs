//! Development-time tracing for the coordinator CLI.
//!
//! Diagnostics go to stderr via `RUST_LOG`; operator-facing results are
//! printed to stdout by the command implementations and are unaffected.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. When unset, dependencies default to `warn` and this
/// crate to `info`, so shard and tuning progress is visible without
/// configuration. Output: stderr, compact.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,guidance_lab=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
