//! File-backed batch progress.
//!
//! Every transition re-reads the file,
//! applies the change and atomically
//! replaces it, so a crashed or
//! concurrent run never loses an
//! earlier transition.

use std::io::ErrorKind;
use std::path::{
  Path,
  PathBuf
};

use chrono::{
  DateTime,
  Utc
};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{
  debug,
  warn
};

use crate::domain::progress::{
  PeriodStatus,
  ProgressFile,
  ProgressSummary
};

#[derive(Debug, Error)]
pub enum ProgressError {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("serialize: {0}")]
  Serialize(#[from] serde_json::Error)
}

pub struct ProgressTracker {
  path: PathBuf,
  lock: Mutex<()>
}

impl ProgressTracker {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      lock: Mutex::new(())
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Current contents; a missing or
  /// unreadable file reads as empty.
  pub async fn load(&self) -> ProgressFile {
    let bytes = match fs::read(&self.path).await {
      | Ok(b) => b,
      | Err(e) if e.kind() == ErrorKind::NotFound => {
        return ProgressFile::default();
      }
      | Err(e) => {
        warn!(
          path = %self.path.display(),
          error = %e,
          "cannot read progress file, starting empty"
        );
        return ProgressFile::default();
      }
    };

    match serde_json::from_slice(&bytes) {
      | Ok(p) => p,
      | Err(e) => {
        warn!(
          path = %self.path.display(),
          error = %e,
          "corrupt progress file, starting empty"
        );
        ProgressFile::default()
      }
    }
  }

  async fn update<F>(&self, f: F) -> Result<(), ProgressError>
  where
    F: FnOnce(&mut ProgressFile)
  {
    let _guard = self.lock.lock().await;

    let mut file = self.load().await;

    f(&mut file);

    write_json_atomic(&self.path, &file).await
  }

  pub async fn mark_in_progress(
    &self,
    key: &str,
    now: DateTime<Utc>
  ) -> Result<(), ProgressError> {
    debug!(period = key, "period in progress");
    self.update(|p| p.mark_in_progress(key, now)).await
  }

  pub async fn mark_completed(
    &self,
    key: &str,
    now: DateTime<Utc>
  ) -> Result<(), ProgressError> {
    debug!(period = key, "period completed");
    self.update(|p| p.mark_completed(key, now)).await
  }

  pub async fn mark_failed(
    &self,
    key: &str,
    now: DateTime<Utc>,
    message: &str
  ) -> Result<(), ProgressError> {
    debug!(period = key, error = message, "period failed");
    self
      .update(|p| p.mark_failed(key, now, message))
      .await
  }

  pub async fn status_of(
    &self,
    key: &str
  ) -> Option<PeriodStatus> {
    self.load().await.status_of(key)
  }

  pub async fn should_skip(&self, key: &str) -> bool {
    self.load().await.should_skip(key)
  }

  pub async fn summary(&self) -> ProgressSummary {
    self.load().await.summary()
  }

  /// Explicit reset; the only way
  /// entries are removed.
  pub async fn clear(&self) -> Result<(), ProgressError> {
    let _guard = self.lock.lock().await;
    match fs::remove_file(&self.path).await {
      | Ok(()) => Ok(()),
      | Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      | Err(e) => Err(e.into())
    }
  }
}

async fn write_json_atomic(
  path: &Path,
  value: &ProgressFile
) -> Result<(), ProgressError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent).await?;
  }

  let bytes = serde_json::to_vec_pretty(value)?;

  let tmp = path.with_extension("tmp");

  fs::write(&tmp, bytes).await?;
  fs::rename(&tmp, path).await?;

  Ok(())
}
