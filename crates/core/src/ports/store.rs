//! Object storage abstraction: a set of
//! containers holding `/`-separated
//! keys.

use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("io: {0}")]
  Io(#[from] std::io::Error),
  #[error("object not found: {container}/{key}")]
  NotFound { container: String, key: String },
  #[error("backend: {0}")]
  Backend(String)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
  pub key:  String,
  pub size: u64
}

pub type LineStream =
  BoxStream<'static, Result<String, StoreError>>;

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
  /// Every object whose key starts with
  /// `prefix`.
  async fn list(
    &self,
    container: &str,
    prefix: &str
  ) -> Result<Vec<ObjectMeta>, StoreError>;

  /// Lines of one object, read lazily so
  /// callers can stop early.
  async fn lines(
    &self,
    container: &str,
    key: &str
  ) -> Result<LineStream, StoreError>;

  /// Whole body, `None` when absent.
  async fn get(
    &self,
    container: &str,
    key: &str
  ) -> Result<Option<Vec<u8>>, StoreError>;

  /// Replaces the object atomically.
  async fn put(
    &self,
    container: &str,
    key: &str,
    body: Vec<u8>
  ) -> Result<(), StoreError>;
}
