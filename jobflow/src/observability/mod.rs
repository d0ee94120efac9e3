//! Logging setup.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary embedding jobflow. [`init_tracing`] is the default choice.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "JOBFLOW_LOG";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Builds the filter: `JOBFLOW_LOG` when set, otherwise `info` (verbose)
/// or `warn`.
#[must_use]
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "info" } else { "warn" })
    })
}

/// Installs a text subscriber. Returns `false` if one was already set.
pub fn init_tracing(verbose: bool) -> bool {
    init_tracing_with(LogFormat::Text, verbose)
}

/// Installs a subscriber with the given format. Returns `false` if one was
/// already set.
pub fn init_tracing_with(format: LogFormat, verbose: bool) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(verbose));
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    }
    .is_ok()
}
