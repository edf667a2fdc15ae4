#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{
  AtomicUsize,
  Ordering
};

use chrono::{
  DateTime,
  TimeDelta,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use futures::StreamExt;
use futures::stream;
use gapfill_core::app::context::AppContext;
use gapfill_core::domain::model::AppConfig;
use gapfill_core::infra::config::ConfigLoader;
use gapfill_core::ports::clock::Clock;
use gapfill_core::ports::search::{
  FetchError,
  SearchApi,
  SearchRequest
};
use gapfill_core::ports::store::{
  LineStream,
  ObjectMeta,
  ObjectStore,
  StoreError
};
use serde_json::{
  Value,
  json
};

pub const TZ: Tz = chrono_tz::Asia::Tokyo;

/// 2024-01-01 00:00 Tokyo.
pub fn t0() -> DateTime<Tz> {
  TZ.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn at(minutes: i64, seconds: i64) -> DateTime<Utc> {
  (t0() + TimeDelta::minutes(minutes) + TimeDelta::seconds(seconds))
    .with_timezone(&Utc)
}

/// Ids sort the same way as time.
pub fn id_for(t: DateTime<Utc>, n: u32) -> String {
  format!("{:012}{:04}", t.timestamp(), n)
}

pub fn note(id: &str, t: DateTime<Utc>) -> Value {
  json!({
    "id": id,
    "createdAt": t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
    "text": "こんにちは"
  })
}

pub fn jsonl(values: &[Value]) -> Vec<u8> {
  let mut out = Vec::new();
  for v in values {
    out.extend_from_slice(v.to_string().as_bytes());
    out.push(b'\n');
  }
  out
}

/// `count` records spread evenly over
/// the 10-minute slot starting at
/// `minutes`.
pub fn slot_notes(minutes: i64, count: u32) -> Vec<Value> {
  (0..count)
    .map(|i| {
      let secs = (600 * i as i64) / count as i64;
      let t = at(minutes, secs);
      note(&id_for(t, i), t)
    })
    .collect()
}

#[derive(Default)]
pub struct MemStore {
  objects:       Mutex<BTreeMap<(String, String), Vec<u8>>>,
  pub lines_read: Arc<AtomicUsize>,
  pub lists:     AtomicUsize
}

impl MemStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&self, container: &str, key: &str, body: Vec<u8>) {
    self
      .objects
      .lock()
      .unwrap()
      .insert((container.to_string(), key.to_string()), body);
  }

  pub fn body(&self, container: &str, key: &str) -> Option<Vec<u8>> {
    self
      .objects
      .lock()
      .unwrap()
      .get(&(container.to_string(), key.to_string()))
      .cloned()
  }

  pub fn keys(&self, container: &str) -> Vec<String> {
    self
      .objects
      .lock()
      .unwrap()
      .keys()
      .filter(|(c, _)| c == container)
      .map(|(_, k)| k.clone())
      .collect()
  }
}

#[async_trait::async_trait]
impl ObjectStore for MemStore {
  async fn list(
    &self,
    container: &str,
    prefix: &str
  ) -> Result<Vec<ObjectMeta>, StoreError> {
    self.lists.fetch_add(1, Ordering::SeqCst);
    Ok(
      self
        .objects
        .lock()
        .unwrap()
        .iter()
        .filter(|((c, k), _)| c == container && k.starts_with(prefix))
        .map(|((_, k), v)| ObjectMeta {
          key:  k.clone(),
          size: v.len() as u64
        })
        .collect()
    )
  }

  async fn lines(
    &self,
    container: &str,
    key: &str
  ) -> Result<LineStream, StoreError> {
    let body = self.body(container, key).ok_or_else(|| {
      StoreError::NotFound {
        container: container.to_string(),
        key:       key.to_string()
      }
    })?;
    let lines: Vec<Result<String, StoreError>> =
      String::from_utf8_lossy(&body)
        .lines()
        .map(|l| Ok(l.to_string()))
        .collect();
    let counter = Arc::clone(&self.lines_read);
    Ok(
      stream::iter(lines)
        .inspect(move |_| {
          counter.fetch_add(1, Ordering::SeqCst);
        })
        .boxed()
    )
  }

  async fn get(
    &self,
    container: &str,
    key: &str
  ) -> Result<Option<Vec<u8>>, StoreError> {
    Ok(self.body(container, key))
  }

  async fn put(
    &self,
    container: &str,
    key: &str,
    body: Vec<u8>
  ) -> Result<(), StoreError> {
    self.insert(container, key, body);
    Ok(())
  }
}

/// Delegates to an inner store but fails
/// every listing of one container.
pub struct BrokenListing {
  pub inner:  Arc<MemStore>,
  pub broken: String
}

#[async_trait::async_trait]
impl ObjectStore for BrokenListing {
  async fn list(
    &self,
    container: &str,
    prefix: &str
  ) -> Result<Vec<ObjectMeta>, StoreError> {
    if container == self.broken {
      return Err(StoreError::Backend("unreachable".into()));
    }
    self.inner.list(container, prefix).await
  }

  async fn lines(
    &self,
    container: &str,
    key: &str
  ) -> Result<LineStream, StoreError> {
    self.inner.lines(container, key).await
  }

  async fn get(
    &self,
    container: &str,
    key: &str
  ) -> Result<Option<Vec<u8>>, StoreError> {
    self.inner.get(container, key).await
  }

  async fn put(
    &self,
    container: &str,
    key: &str,
    body: Vec<u8>
  ) -> Result<(), StoreError> {
    self.inner.put(container, key, body).await
  }
}

/// Serves a fixed record set newest
/// first, honouring `untilId` and
/// `sinceId` by id order.
pub struct ScriptedSearch {
  records:      Vec<Value>,
  pub calls:    AtomicUsize,
  pub requests: Mutex<Vec<SearchRequest>>
}

impl ScriptedSearch {
  pub fn new(mut records: Vec<Value>) -> Self {
    records.sort_by(|a, b| {
      b["id"].as_str().cmp(&a["id"].as_str())
    });
    Self {
      records,
      calls: AtomicUsize::new(0),
      requests: Mutex::new(Vec::new())
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait::async_trait]
impl SearchApi for ScriptedSearch {
  async fn search(
    &self,
    req: &SearchRequest
  ) -> Result<Vec<Value>, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.requests.lock().unwrap().push(req.clone());
    Ok(
      self
        .records
        .iter()
        .filter(|r| {
          let id = r["id"].as_str().unwrap_or("");
          req.until_id.as_deref().is_none_or(|u| id < u)
            && req.since_id.as_deref().is_none_or(|s| id > s)
        })
        .take(req.limit as usize)
        .cloned()
        .collect()
    )
  }
}

/// Returns scripted pages in order, then
/// empty pages forever.
pub struct PagedSearch {
  pages:     Mutex<Vec<Vec<Value>>>,
  pub calls: AtomicUsize
}

impl PagedSearch {
  pub fn new(mut pages: Vec<Vec<Value>>) -> Self {
    pages.reverse();
    Self {
      pages: Mutex::new(pages),
      calls: AtomicUsize::new(0)
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait::async_trait]
impl SearchApi for PagedSearch {
  async fn search(
    &self,
    _req: &SearchRequest
  ) -> Result<Vec<Value>, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    Ok(self.pages.lock().unwrap().pop().unwrap_or_default())
  }
}

pub struct FixedClock(pub i64);

#[async_trait::async_trait]
impl Clock for FixedClock {
  async fn now_epoch_ms(&self) -> i64 {
    self.0
  }
}

pub const TEST_CONFIG: &str = r#"
[app]
timezone = "Asia/Tokyo"
slot_minutes = 10

[api]
base_url = "https://example.invalid"
token = "secret"
limit = 20
page_sleep_seconds = 0

[retry]
max_retries = 2
fallback_wait_seconds = 0

[coverage]
fetch_early_coverage_seconds = 30
verify_early_coverage_seconds = 30
min_valid_lines = 3
max_valid_lines = 50
min_unique_ids = 3
flush_lag_slots = 2

[storage]
[[storage.sources]]
container = "primary"
prefix = "notes"

[storage.destination]
container = "backfill"
prefix = "notes"

[batch]
progress_file = "progress.json"
period_sleep_seconds = 0
"#;

pub fn test_config(base_dir: &Path) -> AppConfig {
  ConfigLoader::from_toml_str(TEST_CONFIG, base_dir).unwrap()
}

pub fn context<S>(
  cfg: AppConfig,
  search: Arc<S>,
  store: Arc<MemStore>
) -> AppContext<S, MemStore, FixedClock>
where
  S: SearchApi
{
  AppContext {
    cfg: Arc::new(cfg),
    search,
    store,
    clock: Arc::new(FixedClock(1_704_034_800_000))
  }
}
