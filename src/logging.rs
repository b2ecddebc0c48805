//! File logging. stdout belongs to the REPL, so nothing is logged there.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "scplay.log";
const DEFAULT_FILTER: &str = "scplay=info,warn";

/// Picks the filter: `--log-level` first, then `RUST_LOG`, then the default.
pub fn build_filter(level: Option<&str>) -> EnvFilter {
    if let Some(filter) = level.and_then(|l| EnvFilter::try_new(l).ok()) {
        return filter;
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Writes logs to `<log_dir>/scplay.log.YYYY-MM-DD`, rotated daily. Keep the
/// returned guard alive until exit or buffered lines are lost.
pub fn init_logging(log_dir: &Path, level: Option<&str>) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("could not create log directory {}", log_dir.display()))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let fmt_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt_layer)
        .try_init()
        .context("a global logger is already installed")?;

    tracing::info!(dir = %log_dir.display(), version = env!("CARGO_PKG_VERSION"), "Logging initialized");
    Ok(guard)
}
