//! # Logging
//!
//! Console plus a non-blocking session log under the data directory. The
//! session log is truncated on every start.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const SESSION_LOG: &str = "session.log";
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// Installs the global subscriber. Keep the guard alive for the whole
/// process or buffered file lines are lost on exit.
pub fn init_logging(data_dir: &str) -> Result<WorkerGuard> {
    prepare_session_log(Path::new(data_dir))?;

    let file_appender = tracing_appender::rolling::never(data_dir, SESSION_LOG);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Creates the data directory and removes the previous session log.
fn prepare_session_log(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let log_path = data_dir.join(SESSION_LOG);
    if log_path.exists() {
        fs::remove_file(&log_path)
            .with_context(|| format!("Failed to clear {}", log_path.display()))?;
    }
    Ok(())
}
