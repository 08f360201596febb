//! Tracing subscriber setup for the `fln` binary.

use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable consulted for the log filter
pub const LOG_ENV: &str = "FLN_LOG";

/// Install a stderr subscriber; `verbose` raises the default to debug.
/// Safe to call more than once (later calls are ignored).
pub fn init(verbose: bool) {
    let default = if verbose { "fenceline=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
