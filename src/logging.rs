//! Tracing setup. The terminal belongs to the UI, so events go to a log
//! file in the cache directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

const LOG_FILE_NAME: &str = "gih_overlay.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the global subscriber writing to `<dir>/gih_overlay.log`.
/// Later calls are no-ops.
pub fn init(dir: &Path) -> Result<PathBuf, LoggingError> {
    let path = dir.join(LOG_FILE_NAME);
    if LOG_GUARD.get().is_some() {
        return Ok(path);
    }
    fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::never(dir, LOG_FILE_NAME));
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer().with_ansi(false).with_writer(writer);
    let subscriber = Registry::default().with(env_filter).with(file_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(LoggingError::SetGlobal)?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("logging to {}", path.display());
    Ok(path)
}
