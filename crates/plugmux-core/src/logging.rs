//! File-backed tracing setup for the plugmux daemon
//!
//! Plugin `log` and `error` events are forwarded into tracing by the
//! demultiplexer, so the subscriber installed here is the one place all
//! plugin diagnostics end up.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

use crate::error::{Result, ResultExt};

/// Environment variable holding the log filter, e.g. `PLUGMUX_LOG=debug`.
pub const LOG_FILTER_ENV: &str = "PLUGMUX_LOG";

/// Filter applied when [`LOG_FILTER_ENV`] is unset. Forwarded plugin events
/// land at info and error level, so info is the useful floor.
const DEFAULT_FILTER: &str = "plugmux=info,warn";

/// Install the global subscriber, writing to a daily-rotated log file.
///
/// Log lines are handed off to a background writer thread; the returned
/// guard flushes it, so hold the guard for the life of the process.
pub fn init() -> Result<WorkerGuard> {
    let dir = log_directory();
    std::fs::create_dir_all(&dir).context("creating log directory")?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(&dir, "plugmux.log"));

    let filter = EnvFilter::builder()
        .with_env_var(LOG_FILTER_ENV)
        .try_from_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_timer(ChronoLocal::new("%Y-%m-%dT%H:%M:%S%.3f%:z".to_string()))
        .init();

    tracing::info!(dir = %dir.display(), "logging initialised");
    Ok(guard)
}

/// Where log files land: `<platform data dir>/plugmux/logs`.
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("plugmux")
        .join("logs")
}
