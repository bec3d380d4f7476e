//! Logging setup.
//!
//! On Linux the subscriber writes to systemd's journal when it is
//! reachable; everywhere else (or when journald is down) log lines go
//! to a daily-rolling file under the data directory.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// The non-blocking writer stops flushing once its guard is dropped, so
// it is parked here for the life of the process.
static WRITER_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

/// Initialize the logging system.
///
/// The `MEDIADEX_LOG` environment variable selects the filter (`trace`,
/// `debug`, `info`, `warn`, `error`); the default is `info`.
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_env("MEDIADEX_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald)
                .init();
            tracing::info!("logging to journald");
            return Ok(());
        }
    }

    init_file_backend(env_filter, log_dir)
}

fn init_file_backend(env_filter: EnvFilter, log_dir: Option<PathBuf>) -> Result<()> {
    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediadex")
            .join("logs")
    });
    std::fs::create_dir_all(&log_dir)?;

    let appender = tracing_appender::rolling::daily(&log_dir, "mediadex.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = WRITER_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();

    tracing::info!("logging to files under {:?}", log_dir);
    Ok(())
}
