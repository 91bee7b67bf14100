//! provides logging helpers

use std::path::Path;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;
use tracing_subscriber::util::TryInitError;

/// Environment variable pointing at a log file; stderr is used when unset.
pub const LOG_PATH_ENV_VAR: &str = "PLUGIN_LOG_PATH";

const DEFAULT_LOG_PREFIX: &str = "plugin.log";
const MAX_LOG_FILES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to create rolling file appender in `{}`: {source}", dir.display())]
    Appender {
        dir: PathBuf,
        source: tracing_appender::rolling::InitError,
    },

    #[error("global tracing subscriber already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Splits a log path into the rotation directory and the file name prefix.
///
/// A path pointing at an existing directory rotates files named
/// `plugin.log.<date>` inside it.
pub fn rotation_target(log_path: &Path) -> (PathBuf, String) {
    if log_path.is_dir() {
        return (log_path.to_path_buf(), DEFAULT_LOG_PREFIX.to_string());
    }

    let dir = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let prefix = log_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_LOG_PREFIX.to_string());

    (dir, prefix)
}

/// initiate the global tracing subscriber
///
/// Events go to stderr, or to a daily rolling file when `log_path` is given.
/// The returned guard must be held for as long as file logging is needed.
pub fn init<P: AsRef<Path>>(log_path: Option<P>) -> Result<Option<WorkerGuard>, LoggingError> {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(filter::LevelFilter::INFO.into())
        .from_env_lossy();

    let Some(log_path) = log_path else {
        let stderr_layer = layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(env_filter);
        registry().with(stderr_layer).try_init()?;
        return Ok(None);
    };

    let (dir, prefix) = rotation_target(log_path.as_ref());
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(MAX_LOG_FILES)
        .build(&dir)
        .map_err(|source| LoggingError::Appender { dir, source })?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter);
    registry().with(file_layer).try_init()?;

    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn rotation_target_for_file_path() {
        let (dir, prefix) = rotation_target(Path::new("/var/log/plugins/cpu.log"));
        assert_eq!(dir, PathBuf::from("/var/log/plugins"));
        assert_eq!(prefix, "cpu.log");
    }

    #[test]
    fn rotation_target_for_bare_file_name() {
        let (dir, prefix) = rotation_target(Path::new("cpu.log"));
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(prefix, "cpu.log");
    }

    #[test]
    fn rotation_target_for_directory() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (dir, prefix) = rotation_target(tmp.path());
        assert_eq!(dir, tmp.path().to_path_buf());
        assert_eq!(prefix, DEFAULT_LOG_PREFIX);
    }
}
