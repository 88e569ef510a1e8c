//! Logging setup for build scripts.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const ENV_LOG: &str = "STDSHIM_LOG";

const DEFAULT_FILTER: &str = "stdshim=info";

/// Install a stderr subscriber filtered by `STDSHIM_LOG`.
///
/// Cargo shows build-script stderr on failure (or with `-vv`). Calling this
/// more than once, or after another subscriber was installed, is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .try_init();
}
