use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{
  EnvFilter,
  Layer,
  fmt
};

use crate::domain::model::{
  AppConfig,
  LogRotation
};

#[derive(Debug, Error)]
pub enum BootError {
  #[error("fatal: {0}")]
  Fatal(String)
}

/// Keeps the file writer flushing until
/// dropped at process exit.
pub struct LogGuard {
  _file: Option<WorkerGuard>
}

pub fn init_logging(
  cfg: &AppConfig
) -> Result<LogGuard, BootError> {
  // Base level from config, still
  // overridable via RUST_LOG.
  let default = format!(
    "{level},gapfill_core={level},\
     reqwest=warn,hyper=warn",
    level = cfg.log_level
  );

  let stdout_filter =
    EnvFilter::try_from_default_env()
      .unwrap_or_else(|_| EnvFilter::new(default));

  let stdout_layer = fmt::layer()
    .with_target(true)
    .with_level(true)
    .with_filter(stdout_filter);

  let (file_layer, guard) = if cfg
    .log_file_enabled
  {
    std::fs::create_dir_all(
      &cfg.log_file_directory
    )
    .map_err(|e| {
      BootError::Fatal(format!(
        "cannot create log directory {}: {e}",
        cfg.log_file_directory.display()
      ))
    })?;

    let appender = match cfg.log_file_rotation
    {
      | LogRotation::Daily => {
        rolling::daily(
          &cfg.log_file_directory,
          &cfg.log_file_name
        )
      }
      | LogRotation::Hourly => {
        rolling::hourly(
          &cfg.log_file_directory,
          &cfg.log_file_name
        )
      }
      | LogRotation::Never => {
        rolling::never(
          &cfg.log_file_directory,
          &cfg.log_file_name
        )
      }
    };

    let (writer, guard) =
      tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
      .with_ansi(false)
      .with_target(true)
      .with_writer(writer)
      .with_filter(EnvFilter::new(
        &cfg.log_file_level
      ));

    (Some(layer), Some(guard))
  } else {
    (None, None)
  };

  tracing_subscriber::registry()
    .with(stdout_layer)
    .with(file_layer)
    .try_init()
    .map_err(|e| {
      BootError::Fatal(format!(
        "logging init failed: {e}"
      ))
    })?;

  Ok(LogGuard {
    _file: guard
  })
}
