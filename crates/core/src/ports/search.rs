//! Remote paginated search endpoint.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// One page request. `until_id` asks
/// for records strictly older than it.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct SearchRequest {
  pub query:    String,
  pub limit:    u32,
  pub since_id: Option<String>,
  pub until_id: Option<String>,
  pub host:     Option<String>
}

#[derive(Debug, Error)]
pub enum FetchError {
  #[error("rate limited (retry after {retry_after:?})")]
  RateLimited {
    retry_after: Option<Duration>
  },
  #[error("transient failure: {0}")]
  Transient(String),
  #[error("http {status}: {body}")]
  Http { status: u16, body: String },
  #[error("undecodable response: {0}")]
  Decode(String),
  #[error("request failed: {0}")]
  Request(String)
}

impl FetchError {
  /// Rate limits, timeouts, connection
  /// failures and 5xx.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      FetchError::RateLimited { .. }
        | FetchError::Transient(_)
    )
  }

  pub fn retry_after(&self) -> Option<Duration> {
    match self {
      | FetchError::RateLimited {
        retry_after
      } => *retry_after,
      | _ => None
    }
  }
}

#[async_trait::async_trait]
pub trait SearchApi: Send + Sync {
  /// Raw page of records, newest first.
  /// An empty page means nothing more in
  /// that direction.
  async fn search(
    &self,
    req: &SearchRequest
  ) -> Result<Vec<Value>, FetchError>;
}
