//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset and no override is configured.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter`. Writes to stderr, leaving stdout to fixture output.
///
/// Later calls are no-ops, so every test may call it.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
