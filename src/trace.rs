//! Tracing setup
//!
//! Library code only emits events; installing a subscriber is the host
//! application's call. These helpers cover the common cases.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a formatted subscriber filtered by `GANTRY_LOG` (default `info`)
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    init_with_filter("info");
}

/// Install a formatted subscriber with an explicit default filter
pub fn init_with_filter(default_filter: &str) {
    let filter = EnvFilter::try_from_env("GANTRY_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
