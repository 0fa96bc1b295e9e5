//! # Logging
//!
//! Installs the process-wide `tracing` subscriber for the binaries. Library
//! code only emits events; it never installs anything.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builds the filter: `RUST_LOG` wins, then `default_level`.
#[must_use]
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initializes console logging with uptime timestamps and module targets.
///
/// Calling it twice is harmless; the second call is ignored.
pub fn init_logging(default_level: &str) {
    let console = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let _ = tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(console)
        .try_init();
}
