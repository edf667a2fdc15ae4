use super::ConfigError;

pub(crate) const DEFAULT_TIMEZONE: &str =
  "Asia/Tokyo";

pub(crate) const DEFAULT_TOKEN_ENV: &str =
  "MISSKEY_TOKEN";

pub(crate) fn default_slot_minutes() -> i64 {
  10
}

pub(crate) fn default_endpoint() -> String {
  "notes/search".to_string()
}

pub(crate) fn default_limit() -> u32 {
  100
}

pub(crate) fn default_page_sleep_seconds()
-> f64 {
  5.0
}

pub(crate) fn default_timeout_seconds() -> u64
{
  30
}

pub(crate) fn default_user_agent() -> String {
  concat!(
    "gapfill/",
    env!("CARGO_PKG_VERSION")
  )
  .to_string()
}

pub(crate) fn default_token_env() -> String {
  DEFAULT_TOKEN_ENV.to_string()
}

pub(crate) fn default_max_retries() -> u32 {
  3
}

pub(crate) fn default_fallback_wait_seconds()
-> f64 {
  5.0
}

pub(crate) fn default_max_wait_seconds() -> f64 {
  300.0
}

pub(crate) fn default_early_coverage_seconds()
-> i64 {
  30
}

pub(crate) fn default_tolerance_seconds() -> i64
{
  10
}

pub(crate) fn default_min_valid_lines() -> usize
{
  100
}

pub(crate) fn default_max_valid_lines() -> usize
{
  9999
}

pub(crate) fn default_min_unique_ids() -> usize {
  100
}

pub(crate) fn default_flush_lag_slots() -> usize
{
  2
}

pub(crate) fn default_progress_file() -> String
{
  ".complement_progress.json".to_string()
}

pub(crate) fn default_period_sleep_seconds()
-> f64 {
  5.0
}

pub(crate) fn default_log_file_enabled() -> bool
{
  false
}

pub(crate) fn default_log_file_directory()
-> String {
  "logs".to_string()
}

pub(crate) fn default_log_file_name() -> String
{
  "gapfill.log".to_string()
}

pub(crate) fn default_log_file_rotation()
-> String {
  "daily".to_string()
}

pub(crate) fn default_log_file_level() -> String
{
  "info".to_string()
}

pub(crate) fn normalize_log_level(
  raw: &str
) -> Result<String, ConfigError> {
  let level = raw.trim().to_ascii_lowercase();
  match level.as_str() {
    | "trace" | "debug" | "info" | "warn"
    | "error" => Ok(level),
    | _ => {
      Err(ConfigError::Invalid(format!(
        "invalid log level '{raw}'"
      )))
    }
  }
}
