use std::path::{
  Path,
  PathBuf
};
use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;

use super::ConfigError;
use crate::domain::model::{
  FetchMode,
  LogRotation
};

pub(crate) fn parse_mode(
  s: Option<&str>
) -> Result<FetchMode, ConfigError> {
  match s.map(|x| x.trim().to_ascii_lowercase())
  {
    | None => Ok(FetchMode::Search),
    | Some(m) if m == "search" => {
      Ok(FetchMode::Search)
    }
    | Some(m) if m == "timeline" => {
      Ok(FetchMode::Timeline)
    }
    | Some(other) => {
      Err(ConfigError::Invalid(format!(
        "invalid api.mode '{other}', \
         expected 'search' or 'timeline'"
      )))
    }
  }
}

pub(crate) fn parse_rotation(
  s: &str
) -> Result<LogRotation, ConfigError> {
  match s.trim().to_ascii_lowercase().as_str()
  {
    | "daily" => Ok(LogRotation::Daily),
    | "hourly" => Ok(LogRotation::Hourly),
    | "never" => Ok(LogRotation::Never),
    | other => {
      Err(ConfigError::Invalid(format!(
        "invalid logging.file_rotation \
         '{other}', expected daily, hourly \
         or never"
      )))
    }
  }
}

pub(crate) fn parse_timezone(
  s: &str
) -> Result<Tz, ConfigError> {
  s.trim().parse().map_err(|_| {
    ConfigError::Invalid(format!(
      "invalid timezone '{s}'"
    ))
  })
}

pub(crate) fn seconds(
  field: &str,
  value: f64
) -> Result<Duration, ConfigError> {
  Duration::try_from_secs_f64(value).map_err(|_| {
    ConfigError::Invalid(format!(
      "{field} must be a non-negative \
       number of seconds, got {value}"
    ))
  })
}

pub(crate) fn tolerance(
  field: &str,
  value: i64
) -> Result<TimeDelta, ConfigError> {
  if value < 0 {
    return Err(ConfigError::Invalid(format!(
      "{field} cannot be negative, got \
       {value}"
    )));
  }
  TimeDelta::try_seconds(value).ok_or_else(|| {
    ConfigError::Invalid(format!(
      "{field} out of range: {value}"
    ))
  })
}

pub(crate) fn non_empty(
  field: &str,
  value: &str
) -> Result<String, ConfigError> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(ConfigError::Invalid(format!(
      "{field} cannot be empty"
    )));
  }
  Ok(trimmed.to_string())
}

/// Relative paths resolve against the
/// config file's directory.
pub(crate) fn resolve_path(
  base_dir: &Path,
  raw: &str
) -> PathBuf {
  let p = Path::new(raw.trim());
  if p.is_absolute() {
    p.to_path_buf()
  } else {
    base_dir.join(p)
  }
}
