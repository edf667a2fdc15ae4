//! Reqwest-backed client implementing
//! the `SearchApi` port; maps statuses
//! into `FetchError` and retries the
//! transient ones.

use std::future::Future;
use std::time::Duration;

use reqwest::{
  StatusCode,
  header
};
use serde_json::{
  Map,
  Value
};
use tracing::{
  debug,
  warn
};

use crate::domain::model::{
  ApiConfig,
  RetryConfig
};
use crate::ports::search::{
  FetchError,
  SearchApi,
  SearchRequest
};

pub struct ReqwestSearch {
  client: reqwest::Client,
  url:    String,
  token:  Option<String>,
  retry:  RetryConfig
}

impl ReqwestSearch {
  pub fn new(
    api: &ApiConfig,
    token: Option<String>,
    retry: RetryConfig
  ) -> Result<Self, reqwest::Error> {
    let client = reqwest::Client::builder()
      .user_agent(api.user_agent.clone())
      .pool_idle_timeout(Duration::from_secs(
        120
      ))
      .timeout(api.timeout)
      .build()?;

    Ok(Self {
      client,
      url: api.url(),
      token,
      retry
    })
  }

  fn body(&self, req: &SearchRequest) -> Value {
    let mut body = Map::new();

    body.insert(
      "query".into(),
      Value::String(req.query.clone())
    );
    body.insert(
      "limit".into(),
      Value::from(req.limit)
    );

    if let Some(id) = &req.since_id {
      body.insert(
        "sinceId".into(),
        Value::String(id.clone())
      );
    }
    if let Some(id) = &req.until_id {
      body.insert(
        "untilId".into(),
        Value::String(id.clone())
      );
    }
    if let Some(host) = &req.host {
      body.insert(
        "host".into(),
        Value::String(host.clone())
      );
    }
    if let Some(token) = &self.token {
      body.insert(
        "i".into(),
        Value::String(token.clone())
      );
    }

    Value::Object(body)
  }

  async fn send_once(
    &self,
    req: &SearchRequest
  ) -> Result<Vec<Value>, FetchError> {
    debug!(
      url = %self.url,
      until_id = ?req.until_id,
      limit = req.limit,
      "search request"
    );

    let resp = self
      .client
      .post(&self.url)
      .json(&self.body(req))
      .send()
      .await
      .map_err(classify_error)?;

    let status = resp.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
      return Err(FetchError::RateLimited {
        retry_after: parse_retry_after(
          resp.headers()
        )
      });
    }

    if status.is_server_error() {
      return Err(FetchError::Transient(
        format!("server error {status}")
      ));
    }

    if !status.is_success() {
      let body =
        resp.text().await.unwrap_or_default();
      return Err(FetchError::Http {
        status: status.as_u16(),
        body
      });
    }

    resp.json::<Vec<Value>>().await.map_err(
      |e| FetchError::Decode(e.to_string())
    )
  }
}

fn classify_error(e: reqwest::Error) -> FetchError {
  if e.is_timeout()
    || e.is_connect()
    || e.is_request()
  {
    FetchError::Transient(e.to_string())
  } else {
    FetchError::Request(e.to_string())
  }
}

/// `Retry-After` as (possibly
/// fractional) seconds.
pub fn parse_retry_after(
  headers: &header::HeaderMap
) -> Option<Duration> {
  let v = headers
    .get(header::RETRY_AFTER)?
    .to_str()
    .ok()?;
  let secs = v.trim().parse::<f64>().ok()?;
  Duration::try_from_secs_f64(secs).ok()
}

/// Runs `op`, retrying transient
/// failures up to `policy.max_retries`
/// times. Rate limits wait the
/// server-supplied delay when present;
/// everything else waits the fallback.
/// No wait exceeds `policy.max_wait`.
/// Non-transient errors return at once.
pub async fn with_retry<T, F, Fut>(
  policy: &RetryConfig,
  mut op: F
) -> Result<T, FetchError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, FetchError>>
{
  let mut retries = 0;

  loop {
    match op().await {
      | Ok(v) => return Ok(v),
      | Err(e)
        if e.is_transient()
          && retries < policy.max_retries =>
      {
        retries += 1;

        let wait = e
          .retry_after()
          .unwrap_or(policy.fallback_wait)
          .min(policy.max_wait);

        warn!(
          error = %e,
          retry = retries,
          max_retries = policy.max_retries,
          wait_ms = wait.as_millis() as u64,
          "search failed, retrying"
        );

        tokio::time::sleep(wait).await;
      }
      | Err(e) => return Err(e)
    }
  }
}

#[async_trait::async_trait]
impl SearchApi for ReqwestSearch {
  async fn search(
    &self,
    req: &SearchRequest
  ) -> Result<Vec<Value>, FetchError> {
    with_retry(&self.retry, || {
      self.send_once(req)
    })
    .await
  }
}
