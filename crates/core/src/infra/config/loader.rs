use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::fs;

use super::ConfigError;
use super::defaults::{
  DEFAULT_TIMEZONE,
  normalize_log_level
};
use super::parse::{
  non_empty,
  parse_mode,
  parse_rotation,
  parse_timezone,
  resolve_path,
  seconds,
  tolerance
};
use super::raw::RawAppFile;
use crate::domain::model::{
  ApiConfig,
  AppConfig,
  BatchConfig,
  CoverageConfig,
  FetchMode,
  RetryConfig,
  SourceSpec,
  StorageConfig
};
use crate::domain::slot::validate_width;

pub struct ConfigLoader;

impl ConfigLoader {
  pub async fn load(
    config_path: &Path
  ) -> Result<AppConfig, ConfigError> {
    let base_dir = config_path
      .parent()
      .ok_or_else(|| {
        ConfigError::Invalid(
          "config path has no parent".into()
        )
      })?;

    let content =
      fs::read_to_string(config_path).await?;

    Self::from_toml_str(&content, base_dir)
  }

  /// Parses and validates config text;
  /// relative paths resolve against
  /// `base_dir`.
  pub fn from_toml_str(
    content: &str,
    base_dir: &Path
  ) -> Result<AppConfig, ConfigError> {
    let raw: RawAppFile =
      toml::from_str(content)?;

    let tz_str = raw
      .app
      .timezone
      .as_deref()
      .filter(|s| !s.trim().is_empty())
      .unwrap_or(DEFAULT_TIMEZONE);

    let timezone = parse_timezone(tz_str)?;

    let slot_width =
      TimeDelta::try_minutes(raw.app.slot_minutes)
        .ok_or_else(|| {
          ConfigError::Invalid(format!(
            "app.slot_minutes out of range: {}",
            raw.app.slot_minutes
          ))
        })?;

    validate_width(slot_width).map_err(|e| {
      ConfigError::Invalid(format!(
        "app.slot_minutes: {e}"
      ))
    })?;

    let api = raw.api;

    if api.limit == 0 {
      return Err(ConfigError::Invalid(
        "api.limit must be greater than 0"
          .into()
      ));
    }

    if api.max_pages == Some(0) {
      return Err(ConfigError::Invalid(
        "api.max_pages must be greater than \
         0 when set"
          .into()
      ));
    }

    let token = api
      .token
      .filter(|t| !t.trim().is_empty())
      .or_else(|| {
        std::env::var(api.token_env.trim())
          .ok()
          .filter(|t| !t.trim().is_empty())
      })
      .map(|t| t.trim().to_string());

    let api_cfg = ApiConfig {
      base_url: non_empty(
        "api.base_url",
        &api.base_url
      )?,
      endpoint: non_empty(
        "api.endpoint",
        &api.endpoint
      )?,
      mode: parse_mode(api.mode.as_deref())?,
      token,
      host: api
        .host
        .filter(|h| !h.trim().is_empty()),
      query: api.query,
      limit: api.limit,
      max_pages: api.max_pages,
      page_sleep: seconds(
        "api.page_sleep_seconds",
        api.page_sleep_seconds
      )?,
      timeout: Duration::from_secs(
        api.timeout_seconds.max(1)
      ),
      user_agent: api.user_agent
    };

    let retry_raw =
      raw.retry.unwrap_or_default();

    let retry = RetryConfig {
      max_retries:   retry_raw.max_retries,
      fallback_wait: seconds(
        "retry.fallback_wait_seconds",
        retry_raw.fallback_wait_seconds
      )?,
      max_wait:      seconds(
        "retry.max_wait_seconds",
        retry_raw.max_wait_seconds
      )?
    };

    let cov = raw.coverage.unwrap_or_default();

    if cov.min_valid_lines >= cov.max_valid_lines
    {
      return Err(ConfigError::Invalid(format!(
        "coverage.min_valid_lines ({}) must \
         be below coverage.max_valid_lines \
         ({})",
        cov.min_valid_lines, cov.max_valid_lines
      )));
    }

    if cov.flush_lag_slots == 0 {
      return Err(ConfigError::Invalid(
        "coverage.flush_lag_slots must be at \
         least 1"
          .into()
      ));
    }

    let coverage = CoverageConfig {
      fetch_early_coverage:  tolerance(
        "coverage.fetch_early_coverage_seconds",
        cov.fetch_early_coverage_seconds
      )?,
      verify_early_coverage: tolerance(
        "coverage.verify_early_coverage_seconds",
        cov.verify_early_coverage_seconds
      )?,
      start_tolerance:       tolerance(
        "coverage.start_tolerance_seconds",
        cov.start_tolerance_seconds
      )?,
      end_tolerance:         tolerance(
        "coverage.end_tolerance_seconds",
        cov.end_tolerance_seconds
      )?,
      min_valid_lines:       cov.min_valid_lines,
      max_valid_lines:       cov.max_valid_lines,
      min_unique_ids:        cov.min_unique_ids,
      flush_lag:             cov.flush_lag_slots
    };

    let storage = raw.storage;

    match storage
      .backend
      .as_deref()
      .map(|b| b.trim().to_ascii_lowercase())
    {
      | None => {}
      | Some(b) if b == "local" => {}
      | Some(other) => {
        return Err(ConfigError::Invalid(
          format!(
            "unsupported storage.backend \
             '{other}', expected 'local'"
          )
        ));
      }
    }

    let destination = SourceSpec {
      container: non_empty(
        "storage.destination.container",
        &storage.destination.container
      )?,
      prefix:    storage.destination.prefix
    };

    let mut sources = Vec::new();
    for s in storage.sources {
      sources.push(SourceSpec {
        container: non_empty(
          "storage.sources.container",
          &s.container
        )?,
        prefix:    s.prefix
      });
    }

    let storage_cfg = StorageConfig {
      base_dir: storage
        .base_dir
        .as_deref()
        .map(|d| resolve_path(base_dir, d))
        .unwrap_or_else(|| base_dir.to_path_buf()),
      sources,
      destination,
      keep_non_japanese: storage.keep_non_japanese
    };

    let batch_raw = raw.batch.unwrap_or_default();

    let batch = BatchConfig {
      progress_file: resolve_path(
        base_dir,
        &batch_raw.progress_file
      ),
      period_sleep:  seconds(
        "batch.period_sleep_seconds",
        batch_raw.period_sleep_seconds
      )?
    };

    let logging = raw.logging.unwrap_or_default();

    let log_level = normalize_log_level(
      logging.level.as_deref().unwrap_or("info")
    )?;

    Ok(AppConfig {
      timezone,
      slot_width,
      api: api_cfg,
      retry,
      coverage,
      storage: storage_cfg,
      batch,
      log_level,
      log_file_enabled: logging.file_enabled,
      log_file_level: normalize_log_level(
        &logging.file_level
      )?,
      log_file_directory: resolve_path(
        base_dir,
        &logging.file_directory
      ),
      log_file_name: non_empty(
        "logging.file_name",
        &logging.file_name
      )?,
      log_file_rotation: parse_rotation(
        &logging.file_rotation
      )?
    })
  }

  /// The API token a backfill needs.
  /// Timeline walks may run anonymously.
  pub fn require_token(
    cfg: &AppConfig
  ) -> Result<Option<String>, ConfigError> {
    match (cfg.api.mode, &cfg.api.token) {
      | (_, Some(t)) => Ok(Some(t.clone())),
      | (FetchMode::Timeline, None) => Ok(None),
      | (FetchMode::Search, None) => {
        Err(ConfigError::Invalid(
          "api.token (or the variable named \
           by api.token_env) is required for \
           search mode"
            .into()
        ))
      }
    }
  }
}
