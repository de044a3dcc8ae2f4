//! Tracing subscriber setup for the CLI.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// With `logging.file` set, output goes to a daily-rolling file next to that
/// path; keep the returned guard alive until exit so buffered lines flush.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  let filter = match EnvFilter::try_from_default_env() {
    Ok(filter) => filter,
    Err(_) => EnvFilter::try_new(&config.level)
      .map_err(|e| Error::Config(format!("Invalid logging.level {:?}: {}", config.level, e)))?,
  };

  let Some(path) = &config.file else {
    tracing_subscriber::registry()
      .with(filter)
      .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
      .try_init()
      .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {}", e)))?;
    return Ok(None);
  };

  let directory = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| std::path::Path::new("."));
  let file_name = path
    .file_name()
    .ok_or_else(|| Error::Config(format!("logging.file {} has no file name", path.display())))?;

  let appender = tracing_appender::rolling::daily(directory, file_name);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(writer).with_ansi(false))
    .try_init()
    .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {}", e)))?;

  Ok(Some(guard))
}
