//! Backward cursor walk over the search
//! API.
//!
//! One `CursorWalk` holds all
//! pagination, dedup and termination
//! state. `CursorFetcher` exposes it
//! either as a bounded stream fed by a
//! background task or as a collected,
//! time-sorted list.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{
  DateTime,
  TimeDelta,
  Utc
};
use tokio::sync::{
  mpsc,
  watch
};
use tokio::task::JoinHandle;
use tracing::{
  debug,
  info
};

use crate::domain::model::{
  ApiConfig,
  FetchMode
};
use crate::domain::period::Period;
use crate::domain::record::{
  Record,
  dedup_sorted
};
use crate::ports::search::{
  FetchError,
  SearchApi,
  SearchRequest
};

/// Consecutive empty pages that end a
/// search-mode walk.
const EMPTY_PAGE_LIMIT: u32 = 2;

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct FetchCursor {
  pub until_id: Option<String>,
  pub since_id: Option<String>
}

#[derive(Debug, Clone)]
pub struct FetchPlan {
  pub mode:           FetchMode,
  pub window_start:   DateTime<Utc>,
  pub window_end:     DateTime<Utc>,
  pub query:          String,
  pub host:           Option<String>,
  pub limit:          u32,
  pub cursor:         FetchCursor,
  pub early_coverage: TimeDelta,
  pub max_pages:      Option<u32>,
  pub page_sleep:     Duration
}

impl FetchPlan {
  pub fn for_period(
    api: &ApiConfig,
    early_coverage: TimeDelta,
    period: &Period
  ) -> Self {
    Self {
      mode: api.mode,
      window_start: period.window_start(),
      window_end: period.window_end(),
      query: api.query.clone(),
      host: api.host.clone(),
      limit: api.limit,
      cursor: FetchCursor {
        until_id: period.until_id.clone(),
        since_id: period.since_id.clone()
      },
      early_coverage,
      max_pages: api.max_pages,
      page_sleep: api.page_sleep
    }
  }

  fn early_threshold(&self) -> DateTime<Utc> {
    self.window_start + self.early_coverage
  }

  fn in_window(&self, t: DateTime<Utc>) -> bool {
    match self.mode {
      | FetchMode::Search => {
        t >= self.window_start && t < self.window_end
      }
      | FetchMode::Timeline => t < self.window_end
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  /// The oldest yielded record reached
  /// `window_start + early_coverage`.
  EarlyCoverage,
  EmptyPages,
  PageLimit,
  /// A page reached past the window
  /// start.
  Overshoot,
  /// A page held no usable record to
  /// move the cursor.
  NoCursor,
  CursorStalled,
  ShortPage,
  Cancelled
}

#[derive(Debug, Clone, Default)]
pub struct WalkSummary {
  pub pages:         u32,
  pub yielded:       usize,
  pub duplicates:    usize,
  pub out_of_window: usize,
  pub malformed:     usize,
  pub stop_reason:   Option<StopReason>
}

pub struct CursorWalk<S>
where
  S: SearchApi + ?Sized
{
  api:            Arc<S>,
  plan:           FetchPlan,
  cursor:         FetchCursor,
  seen:           HashSet<String>,
  empty_streak:   u32,
  oldest_yielded: Option<DateTime<Utc>>,
  summary:        WalkSummary
}

impl<S> CursorWalk<S>
where
  S: SearchApi + ?Sized
{
  pub fn new(api: Arc<S>, plan: FetchPlan) -> Self {
    let cursor = plan.cursor.clone();
    Self {
      api,
      plan,
      cursor,
      seen: HashSet::new(),
      empty_streak: 0,
      oldest_yielded: None,
      summary: WalkSummary::default()
    }
  }

  pub fn summary(&self) -> &WalkSummary {
    &self.summary
  }

  pub fn is_done(&self) -> bool {
    self.summary.stop_reason.is_some()
  }

  fn stop(&mut self, reason: StopReason) {
    if self.summary.stop_reason.is_none() {
      debug!(
        ?reason,
        pages = self.summary.pages,
        "cursor walk stopped"
      );
      self.summary.stop_reason = Some(reason);
    }
  }

  pub(crate) fn cancel(&mut self) {
    self.stop(StopReason::Cancelled);
  }

  /// Fetches one page and returns its
  /// new in-window records, ascending.
  /// `Ok(None)` once the walk has
  /// stopped.
  pub async fn next_page(
    &mut self
  ) -> Result<Option<Vec<Record>>, FetchError> {
    if self.is_done() {
      return Ok(None);
    }

    if let Some(max) = self.plan.max_pages
      && self.summary.pages >= max
    {
      self.stop(StopReason::PageLimit);
      return Ok(None);
    }

    if self.summary.pages > 0
      && !self.plan.page_sleep.is_zero()
    {
      tokio::time::sleep(self.plan.page_sleep).await;
    }

    let req = SearchRequest {
      query:    self.plan.query.clone(),
      limit:    self.plan.limit,
      since_id: self.cursor.since_id.clone(),
      until_id: self.cursor.until_id.clone(),
      host:     self.plan.host.clone()
    };

    let raw = self.api.search(&req).await?;

    self.summary.pages += 1;

    let raw_len = raw.len();

    if raw_len == 0 {
      self.empty_streak += 1;

      let limit = match self.plan.mode {
        | FetchMode::Search => EMPTY_PAGE_LIMIT,
        | FetchMode::Timeline => 1
      };

      if self.empty_streak >= limit {
        self.stop(StopReason::EmptyPages);
      }

      return Ok(Some(Vec::new()));
    }

    self.empty_streak = 0;

    let mut page = Vec::with_capacity(raw_len);
    for v in raw {
      match Record::from_value(v) {
        | Some(r) => page.push(r),
        | None => self.summary.malformed += 1
      }
    }

    let Some(oldest) = page
      .iter()
      .min_by(|a, b| {
        a.created_at
          .cmp(&b.created_at)
          .then_with(|| a.id.cmp(&b.id))
      })
      .map(|r| (r.id.clone(), r.created_at))
    else {
      self.stop(StopReason::NoCursor);
      return Ok(Some(Vec::new()));
    };

    let (oldest_id, oldest_at) = oldest;

    let stalled = self.cursor.until_id.as_deref()
      == Some(oldest_id.as_str());

    self.cursor.until_id = Some(oldest_id);

    let mut survivors = Vec::new();
    for r in page {
      if !self.plan.in_window(r.created_at) {
        self.summary.out_of_window += 1;
        continue;
      }
      if !self.seen.insert(r.id.clone()) {
        self.summary.duplicates += 1;
        continue;
      }
      survivors.push(r);
    }

    survivors.sort_by(|a, b| {
      a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.id.cmp(&b.id))
    });

    if let Some(first) = survivors.first() {
      let t = first.created_at;
      self.oldest_yielded = Some(
        self.oldest_yielded.map_or(t, |o| o.min(t))
      );
    }

    self.summary.yielded += survivors.len();

    debug!(
      page = self.summary.pages,
      raw = raw_len,
      yielded = survivors.len(),
      oldest = %oldest_at,
      until_id = ?self.cursor.until_id,
      "fetched page"
    );

    match self.plan.mode {
      | FetchMode::Search => {
        if self
          .oldest_yielded
          .is_some_and(|o| o <= self.plan.early_threshold())
        {
          self.stop(StopReason::EarlyCoverage);
        } else if oldest_at < self.plan.window_start {
          self.stop(StopReason::Overshoot);
        } else if stalled {
          self.stop(StopReason::CursorStalled);
        }
      }
      | FetchMode::Timeline => {
        if stalled {
          self.stop(StopReason::CursorStalled);
        } else if raw_len < self.plan.limit as usize {
          self.stop(StopReason::ShortPage);
        } else if oldest_at < self.plan.window_start {
          self.stop(StopReason::Overshoot);
        }
      }
    }

    Ok(Some(survivors))
  }

  /// Runs the walk to completion and
  /// returns every record, deduplicated
  /// and ascending by `created_at`.
  pub async fn collect_all(
    mut self
  ) -> Result<(Vec<Record>, WalkSummary), FetchError> {
    let mut all = Vec::new();

    while let Some(page) = self.next_page().await? {
      all.extend(page);
    }

    Ok((dedup_sorted(all), self.summary))
  }
}

/// Records flowing out of a background
/// walk over a bounded channel.
/// Dropping the stream (or calling
/// `finish`) stops the walk.
pub struct RecordStream {
  rx:     mpsc::Receiver<Result<Record, FetchError>>,
  stop:   watch::Sender<bool>,
  handle: JoinHandle<WalkSummary>
}

impl RecordStream {
  pub async fn next(
    &mut self
  ) -> Option<Result<Record, FetchError>> {
    self.rx.recv().await
  }

  /// Stops the walk without losing
  /// anything already fetched: the page
  /// in hand is delivered in full, then
  /// every queued record is returned.
  pub async fn close_and_drain(
    mut self
  ) -> (Vec<Record>, WalkSummary) {
    let _ = self.stop.send(true);

    let mut queued = Vec::new();
    while let Some(item) = self.rx.recv().await {
      match item {
        | Ok(r) => queued.push(r),
        | Err(e) => {
          debug!(error = %e, "fetch error after stop");
        }
      }
    }

    (queued, join_walk(self.handle).await)
  }

  /// Stops the walk and discards
  /// whatever is still queued.
  pub async fn finish(self) -> WalkSummary {
    let _ = self.stop.send(true);
    drop(self.rx);
    join_walk(self.handle).await
  }
}

async fn join_walk(
  handle: JoinHandle<WalkSummary>
) -> WalkSummary {
  match handle.await {
    | Ok(summary) => summary,
    | Err(_) => {
      WalkSummary {
        stop_reason: Some(StopReason::Cancelled),
        ..WalkSummary::default()
      }
    }
  }
}

pub struct CursorFetcher<S>
where
  S: SearchApi + ?Sized
{
  api: Arc<S>
}

impl<S> CursorFetcher<S>
where
  S: SearchApi + ?Sized + 'static
{
  pub fn new(api: Arc<S>) -> Self {
    Self {
      api
    }
  }

  pub fn walk(&self, plan: FetchPlan) -> CursorWalk<S> {
    CursorWalk::new(Arc::clone(&self.api), plan)
  }

  pub async fn collect_all(
    &self,
    plan: FetchPlan
  ) -> Result<(Vec<Record>, WalkSummary), FetchError> {
    self.walk(plan).collect_all().await
  }

  /// Spawns the walk; at most
  /// `capacity` records wait in the
  /// channel before the walk blocks.
  pub fn stream(
    &self,
    plan: FetchPlan,
    capacity: usize
  ) -> RecordStream {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (stop, mut stop_rx) = watch::channel(false);

    let mut walk = self.walk(plan);

    let handle = tokio::spawn(async move {
      loop {
        let page = tokio::select! {
          biased;
          _ = stop_rx.changed() => None,
          _ = tx.closed() => None,
          page = walk.next_page() => Some(page)
        };

        let Some(page) = page else {
          walk.cancel();
          break;
        };

        match page {
          | Ok(Some(records)) => {
            for r in records {
              if tx.send(Ok(r)).await.is_err() {
                walk.cancel();
                break;
              }
            }
          }
          | Ok(None) => break,
          | Err(e) => {
            let _ = tx.send(Err(e)).await;
            break;
          }
        }
      }

      let summary = walk.summary().clone();

      info!(
        pages = summary.pages,
        yielded = summary.yielded,
        duplicates = summary.duplicates,
        stop = ?summary.stop_reason,
        "cursor walk finished"
      );

      summary
    });

    RecordStream {
      rx,
      stop,
      handle
    }
  }
}
