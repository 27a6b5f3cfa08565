use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use glob::glob;
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Rolled log files kept per application.
pub const DEFAULT_RETAINED_LOGS: usize = 7;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid log filter {0:?}")]
    Filter(String),

    #[error("a global subscriber is already installed: {0}")]
    Init(String),
}

/// Installs the global subscriber: an `EnvFilter` (`RUST_LOG` first, then
/// `level`), a console layer and a JSON layer on a daily rolling file named
/// after `app_name`.
///
/// The returned guard flushes the file writer on drop; keep it alive for
/// the life of the process.
pub fn setup_logging(app_name: &str, log_dir: &Path, level: &str) -> Result<WorkerGuard, LoggingError> {
    fs::create_dir_all(log_dir).map_err(|source| LoggingError::LogDir {
        path: log_dir.to_path_buf(),
        source,
    })?;
    let pruned = prune_old_logs(app_name, log_dir, DEFAULT_RETAINED_LOGS);

    let file_appender = rolling::daily(log_dir, format!("{app_name}.log"));
    let (writer, guard) = non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|_| LoggingError::Filter(level.to_string()))?;

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer().with_ansi(false).with_writer(writer).json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    info!(app = app_name, log_dir = %log_dir.display(), level, pruned, "logging initialized");
    Ok(guard)
}

/// Deletes all but the `keep` newest `<app_name>.log.*` files. Returns how
/// many were removed. Files that cannot be inspected or removed are skipped.
pub fn prune_old_logs(app_name: &str, log_dir: &Path, keep: usize) -> usize {
    let pattern = format!("{}/{}.log.*", log_dir.display(), app_name);
    let Ok(paths) = glob(&pattern) else {
        return 0;
    };

    let mut files: Vec<(std::time::SystemTime, PathBuf)> = paths
        .filter_map(Result::ok)
        .filter_map(|path| {
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .collect();
    // Newest first; ties broken by name so the order is stable.
    files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    files
        .into_iter()
        .skip(keep)
        .filter(|(_, path)| fs::remove_file(path).is_ok())
        .count()
}
