//! Terminoda session core
//!
//! Multiplexes terminal output, transfer progress and resize acknowledgements from
//! many concurrent remote sessions onto per-session state, and coordinates file
//! transfers and remote directory browsing for each session.

pub mod cli;
pub mod config;
pub mod demo;
pub mod error;
pub mod event_bus;
pub mod metrics;
pub mod navigator;
pub mod output;
pub mod resize;
pub mod session;
pub mod transfer;
pub mod transport;
pub mod ui;

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;

pub use error::{CoreError, CoreResult};

/// Application result type for consistent error handling
pub type AppResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Initialize tracing with a non-blocking file writer
///
/// Logs go to `log_file` so they never interleave with interactive output. The
/// returned guard flushes pending lines on drop and must be kept alive by the caller.
pub fn init_logging(level: &str, log_file: &str) -> Result<WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let path = Path::new(log_file);
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("Log path {} has no file name", log_file))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("terminoda={}", level).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
