//! Per-period batch state, persisted as
//! JSON between runs.

use std::collections::BTreeMap;

use chrono::{
  DateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize
)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
  Pending,
  InProgress,
  Completed,
  Failed
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Serialize,
  Deserialize
)]
pub struct PeriodProgress {
  pub status:        PeriodStatus,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub started_at:    Option<DateTime<Utc>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub completed_at:  Option<DateTime<Utc>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub failed_at:     Option<DateTime<Utc>>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub error_message: Option<String>
}

impl PeriodProgress {
  fn pending() -> Self {
    Self {
      status:        PeriodStatus::Pending,
      started_at:    None,
      completed_at:  None,
      failed_at:     None,
      error_message: None
    }
  }
}

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Serialize,
  Deserialize
)]
pub struct ProgressFile {
  #[serde(default)]
  pub last_updated: Option<DateTime<Utc>>,
  #[serde(default)]
  pub periods:
    BTreeMap<String, PeriodProgress>
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq,
)]
pub struct ProgressSummary {
  pub pending:     usize,
  pub in_progress: usize,
  pub completed:   usize,
  pub failed:      usize
}

impl ProgressSummary {
  pub fn total(&self) -> usize {
    self.pending
      + self.in_progress
      + self.completed
      + self.failed
  }
}

impl ProgressFile {
  pub fn status_of(
    &self,
    key: &str
  ) -> Option<PeriodStatus> {
    self.periods.get(key).map(|p| p.status)
  }

  /// Only `completed` is terminal;
  /// `failed` and stale `in_progress`
  /// entries are attempted again.
  pub fn should_skip(
    &self,
    key: &str
  ) -> bool {
    matches!(
      self.status_of(key),
      Some(PeriodStatus::Completed)
    )
  }

  pub fn mark_in_progress(
    &mut self,
    key: &str,
    now: DateTime<Utc>
  ) {
    let entry = self.entry(key);
    entry.status = PeriodStatus::InProgress;
    entry.started_at = Some(now);
    entry.error_message = None;
    self.last_updated = Some(now);
  }

  pub fn mark_completed(
    &mut self,
    key: &str,
    now: DateTime<Utc>
  ) {
    let entry = self.entry(key);
    entry.status = PeriodStatus::Completed;
    entry.completed_at = Some(now);
    entry.error_message = None;
    self.last_updated = Some(now);
  }

  pub fn mark_failed(
    &mut self,
    key: &str,
    now: DateTime<Utc>,
    message: &str
  ) {
    let entry = self.entry(key);
    entry.status = PeriodStatus::Failed;
    entry.failed_at = Some(now);
    entry.error_message =
      Some(message.to_string());
    self.last_updated = Some(now);
  }

  pub fn summary(&self) -> ProgressSummary {
    let mut s = ProgressSummary::default();
    for p in self.periods.values() {
      match p.status {
        | PeriodStatus::Pending => {
          s.pending += 1
        }
        | PeriodStatus::InProgress => {
          s.in_progress += 1
        }
        | PeriodStatus::Completed => {
          s.completed += 1
        }
        | PeriodStatus::Failed => s.failed += 1
      }
    }
    s
  }

  fn entry(
    &mut self,
    key: &str
  ) -> &mut PeriodProgress {
    self
      .periods
      .entry(key.to_string())
      .or_insert_with(PeriodProgress::pending)
  }
}
