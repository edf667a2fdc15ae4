use chrono::{
  DateTime,
  NaiveDateTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;

pub fn epoch_ms_to_utc(ms: i64) -> DateTime<Utc> {
  Utc
    .timestamp_millis_opt(ms)
    .single()
    .unwrap_or(DateTime::UNIX_EPOCH)
}

pub fn format_local(
  t: DateTime<Utc>,
  zone: &Tz
) -> String {
  t.with_timezone(zone)
    .format("%Y-%m-%d %H:%M:%S%.3f %Z")
    .to_string()
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]` or
/// the same with a space, read as local
/// time in `zone`.
pub fn parse_local(
  s: &str,
  zone: Tz
) -> Result<DateTime<Tz>, String> {
  let trimmed = s.trim();

  let naive = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M"
  ]
  .iter()
  .find_map(|f| {
    NaiveDateTime::parse_from_str(trimmed, f)
      .ok()
  })
  .ok_or_else(|| {
    format!(
      "invalid local time '{trimmed}', \
       expected YYYY-MM-DDTHH:MM"
    )
  })?;

  zone
    .from_local_datetime(&naive)
    .earliest()
    .ok_or_else(|| {
      format!(
        "'{trimmed}' does not exist in \
         {zone}"
      )
    })
}
