//! Tracing subscriber setup for the CLI host

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// File name prefix of the rolling log files
pub const LOG_FILE_PREFIX: &str = "version-lens.log";

const DEFAULT_DIRECTIVE: &str = "info";

/// Build the filter from `RUST_LOG`, falling back to `info`
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber: JSON lines into a daily rolling file under
/// `log_dir`, plus human-readable stderr output when `verbose` is set
///
/// Keep the returned guard alive for as long as logs should be flushed.
pub fn init(log_dir: &Path, verbose: bool) -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(true)
        .with_filter(env_filter());

    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(env_filter())
    });

    // A subscriber may already be installed (e.g. by a test harness)
    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    guard
}
