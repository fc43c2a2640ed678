//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize logging for the process. `RUST_LOG` wins when set; otherwise
/// `verbose` selects between `debug` and `warn` for this crate.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(verbose: bool) {
    let default = if verbose { "divvy=debug" } else { "divvy=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // Logs go to stderr so command output on stdout stays clean.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
