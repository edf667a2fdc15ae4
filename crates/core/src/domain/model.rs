use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;
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
  Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
  /// Id-cursor walk over a search
  /// endpoint, filtered to the window.
  Search,
  /// Best-effort walk over a timeline
  /// endpoint.
  Timeline
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum LogRotation {
  Daily,
  Hourly,
  Never
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url:   String,
  pub endpoint:   String,
  pub mode:       FetchMode,
  pub token:      Option<String>,
  pub host:       Option<String>,
  pub query:      String,
  pub limit:      u32,
  pub max_pages:  Option<u32>,
  pub page_sleep: Duration,
  pub timeout:    Duration,
  pub user_agent: String
}

impl ApiConfig {
  pub fn url(&self) -> String {
    format!(
      "{}/api/{}",
      self.base_url.trim_end_matches('/'),
      self.endpoint.trim_start_matches('/')
    )
  }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
  /// Retries after the first attempt.
  pub max_retries:   u32,
  pub fallback_wait: Duration,
  /// Ceiling on any single wait,
  /// server-supplied or not.
  pub max_wait:      Duration
}

#[derive(Debug, Clone, Copy)]
pub struct CoverageConfig {
  pub fetch_early_coverage:  TimeDelta,
  pub verify_early_coverage: TimeDelta,
  pub start_tolerance:       TimeDelta,
  pub end_tolerance:         TimeDelta,
  pub min_valid_lines:       usize,
  pub max_valid_lines:       usize,
  pub min_unique_ids:        usize,
  pub flush_lag:             usize
}

/// Line-count bounds for a stored
/// object to count as valid:
/// `min < count <= max`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct ValidityBounds {
  pub min_lines: usize,
  pub max_lines: usize
}

impl ValidityBounds {
  pub fn accepts(&self, count: usize) -> bool {
    count > self.min_lines
      && count <= self.max_lines
  }
}

impl CoverageConfig {
  pub fn validity(&self) -> ValidityBounds {
    ValidityBounds {
      min_lines: self.min_valid_lines,
      max_lines: self.max_valid_lines
    }
  }
}

/// One `(container, prefix)` location
/// slot objects live under.
#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
pub struct SourceSpec {
  pub container: String,
  #[serde(default)]
  pub prefix:    String
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
  pub base_dir:          PathBuf,
  pub sources:           Vec<SourceSpec>,
  pub destination:       SourceSpec,
  /// Write fetched records whose text has
  /// no Japanese characters too.
  pub keep_non_japanese: bool
}

impl StorageConfig {
  /// Original sources followed by the
  /// destination, skipping a duplicate.
  pub fn with_destination(
    &self
  ) -> Vec<SourceSpec> {
    let mut all = self.sources.clone();
    if !all.contains(&self.destination) {
      all.push(self.destination.clone());
    }
    all
  }
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
  pub progress_file: PathBuf,
  pub period_sleep:  Duration
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub timezone:           Tz,
  pub slot_width:         TimeDelta,
  pub api:                ApiConfig,
  pub retry:              RetryConfig,
  pub coverage:           CoverageConfig,
  pub storage:            StorageConfig,
  pub batch:              BatchConfig,
  pub log_level:          String,
  pub log_file_enabled:   bool,
  pub log_file_level:     String,
  pub log_file_directory: PathBuf,
  pub log_file_name:      String,
  pub log_file_rotation:  LogRotation
}
