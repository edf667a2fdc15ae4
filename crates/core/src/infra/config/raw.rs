use serde::Deserialize;

use super::defaults::{
  default_early_coverage_seconds,
  default_endpoint,
  default_fallback_wait_seconds,
  default_max_wait_seconds,
  default_flush_lag_slots,
  default_limit,
  default_log_file_directory,
  default_log_file_enabled,
  default_log_file_level,
  default_log_file_name,
  default_log_file_rotation,
  default_max_retries,
  default_max_valid_lines,
  default_min_unique_ids,
  default_min_valid_lines,
  default_page_sleep_seconds,
  default_period_sleep_seconds,
  default_progress_file,
  default_slot_minutes,
  default_timeout_seconds,
  default_token_env,
  default_tolerance_seconds,
  default_user_agent
};
use crate::domain::model::SourceSpec;

#[derive(Debug, Deserialize)]
pub(crate) struct RawAppFile {
  #[serde(default)]
  pub app:      RawApp,
  pub api:      RawApi,
  #[serde(default)]
  pub retry:    Option<RawRetry>,
  #[serde(default)]
  pub coverage: Option<RawCoverage>,
  pub storage:  RawStorage,
  #[serde(default)]
  pub batch:    Option<RawBatch>,
  #[serde(default)]
  pub logging:  Option<RawLogging>
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawApp {
  pub timezone:     Option<String>,
  #[serde(default = "default_slot_minutes")]
  pub slot_minutes: i64
}

impl Default for RawApp {
  fn default() -> Self {
    Self {
      timezone:     None,
      slot_minutes: default_slot_minutes()
    }
  }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawApi {
  pub base_url:           String,
  #[serde(default = "default_endpoint")]
  pub endpoint:           String,
  pub mode:               Option<String>,
  pub token:              Option<String>,
  #[serde(default = "default_token_env")]
  pub token_env:          String,
  pub host:               Option<String>,
  #[serde(default)]
  pub query:              String,
  #[serde(default = "default_limit")]
  pub limit:              u32,
  pub max_pages:          Option<u32>,
  #[serde(
    default = "default_page_sleep_seconds"
  )]
  pub page_sleep_seconds: f64,
  #[serde(
    default = "default_timeout_seconds"
  )]
  pub timeout_seconds:    u64,
  #[serde(default = "default_user_agent")]
  pub user_agent:         String
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawRetry {
  #[serde(default = "default_max_retries")]
  pub max_retries:           u32,
  #[serde(
    default = "default_fallback_wait_seconds"
  )]
  pub fallback_wait_seconds: f64,
  #[serde(default = "default_max_wait_seconds")]
  pub max_wait_seconds:      f64
}

impl Default for RawRetry {
  fn default() -> Self {
    Self {
      max_retries:           default_max_retries(),
      fallback_wait_seconds:
        default_fallback_wait_seconds(),
      max_wait_seconds:      default_max_wait_seconds()
    }
  }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawCoverage {
  #[serde(
    default = "default_early_coverage_seconds"
  )]
  pub fetch_early_coverage_seconds:  i64,
  #[serde(
    default = "default_early_coverage_seconds"
  )]
  pub verify_early_coverage_seconds: i64,
  #[serde(
    default = "default_tolerance_seconds"
  )]
  pub start_tolerance_seconds:       i64,
  #[serde(
    default = "default_tolerance_seconds"
  )]
  pub end_tolerance_seconds:         i64,
  #[serde(
    default = "default_min_valid_lines"
  )]
  pub min_valid_lines:               usize,
  #[serde(
    default = "default_max_valid_lines"
  )]
  pub max_valid_lines:               usize,
  #[serde(default = "default_min_unique_ids")]
  pub min_unique_ids:                usize,
  #[serde(
    default = "default_flush_lag_slots"
  )]
  pub flush_lag_slots:               usize
}

impl Default for RawCoverage {
  fn default() -> Self {
    Self {
      fetch_early_coverage_seconds:
        default_early_coverage_seconds(),
      verify_early_coverage_seconds:
        default_early_coverage_seconds(),
      start_tolerance_seconds:
        default_tolerance_seconds(),
      end_tolerance_seconds:
        default_tolerance_seconds(),
      min_valid_lines: default_min_valid_lines(),
      max_valid_lines: default_max_valid_lines(),
      min_unique_ids: default_min_unique_ids(),
      flush_lag_slots: default_flush_lag_slots()
    }
  }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawStorage {
  pub backend:           Option<String>,
  pub base_dir:          Option<String>,
  #[serde(default)]
  pub sources:           Vec<SourceSpec>,
  pub destination:       SourceSpec,
  #[serde(default)]
  pub keep_non_japanese: bool
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBatch {
  #[serde(default = "default_progress_file")]
  pub progress_file:        String,
  #[serde(
    default = "default_period_sleep_seconds"
  )]
  pub period_sleep_seconds: f64
}

impl Default for RawBatch {
  fn default() -> Self {
    Self {
      progress_file:        default_progress_file(),
      period_sleep_seconds:
        default_period_sleep_seconds()
    }
  }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLogging {
  pub level:          Option<String>,
  #[serde(
    default = "default_log_file_enabled"
  )]
  pub file_enabled:   bool,
  #[serde(
    default = "default_log_file_directory"
  )]
  pub file_directory: String,
  #[serde(default = "default_log_file_name")]
  pub file_name:      String,
  #[serde(
    default = "default_log_file_rotation"
  )]
  pub file_rotation:  String,
  #[serde(default = "default_log_file_level")]
  pub file_level:     String
}

impl Default for RawLogging {
  fn default() -> Self {
    Self {
      level:          None,
      file_enabled:   default_log_file_enabled(),
      file_directory: default_log_file_directory(),
      file_name:      default_log_file_name(),
      file_rotation:  default_log_file_rotation(),
      file_level:     default_log_file_level()
    }
  }
}
