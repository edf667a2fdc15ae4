//! Fixed-width time windows and the
//! calendar walk that produces them.
//!
//! Slots are anchored at local midnight
//! of the configured zone, so a width
//! must divide a day evenly for
//! `Slot::containing` to agree with
//! stored slot keys.

use chrono::{
  DateTime,
  NaiveDate,
  NaiveDateTime,
  TimeDelta,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use thiserror::Error;

/// Filename stem format, also the
/// identity used for grouping and
/// dedup.
pub const SLOT_KEY_FORMAT: &str =
  "%Y-%m-%d_%H-%M";

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
  #[error(
    "slot width must be positive, got \
     {0}s"
  )]
  NonPositiveWidth(i64),
  #[error(
    "slot width of {0}s does not divide \
     a day"
  )]
  UnalignedWidth(i64),
  #[error("invalid slot key '{0}'")]
  BadKey(String),
  #[error(
    "local time {0} does not exist in \
     the configured zone"
  )]
  NonexistentLocalTime(NaiveDateTime)
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
pub struct Slot {
  pub start: DateTime<Tz>,
  pub width: TimeDelta
}

impl Slot {
  pub fn new(
    start: DateTime<Tz>,
    width: TimeDelta
  ) -> Self {
    Self {
      start,
      width
    }
  }

  pub fn end(&self) -> DateTime<Tz> {
    self.start + self.width
  }

  pub fn start_utc(&self) -> DateTime<Utc> {
    self.start.with_timezone(&Utc)
  }

  pub fn end_utc(&self) -> DateTime<Utc> {
    self.end().with_timezone(&Utc)
  }

  pub fn key(&self) -> String {
    self
      .start
      .format(SLOT_KEY_FORMAT)
      .to_string()
  }

  /// Local calendar day the slot starts
  /// on.
  pub fn day(&self) -> NaiveDate {
    self.start.date_naive()
  }

  pub fn next(&self) -> Slot {
    Slot::new(self.end(), self.width)
  }

  pub fn prev(&self) -> Slot {
    Slot::new(
      self.start - self.width,
      self.width
    )
  }

  pub fn contains(
    &self,
    t: DateTime<Utc>
  ) -> bool {
    t >= self.start_utc()
      && t < self.end_utc()
  }

  /// `{prefix}/YYYY/MM/DD/HH/{key}.jsonl`
  pub fn object_key(
    &self,
    prefix: &str
  ) -> String {
    let rel = format!(
      "{}/{}.jsonl",
      self.start.format("%Y/%m/%d/%H"),
      self.key()
    );
    join_prefix(prefix, &rel)
  }

  /// Slot whose window holds `t`,
  /// floored from local midnight.
  pub fn containing(
    t: DateTime<Utc>,
    width: TimeDelta,
    tz: Tz
  ) -> Result<Slot, SlotError> {
    let secs = validate_width(width)?;

    let local = t.with_timezone(&tz);

    let naive = local.naive_local();

    let midnight = naive
      .date()
      .and_hms_opt(0, 0, 0)
      .unwrap_or(naive);

    let since_midnight =
      (naive - midnight).num_seconds();

    let floored = midnight
      + TimeDelta::seconds(
        since_midnight - since_midnight % secs
      );

    let start = resolve_local(tz, floored)?;

    Ok(Slot::new(start, width))
  }

  pub fn from_key(
    key: &str,
    width: TimeDelta,
    tz: Tz
  ) -> Result<Slot, SlotError> {
    let naive =
      NaiveDateTime::parse_from_str(
        key.trim(),
        SLOT_KEY_FORMAT
      )
      .map_err(|_| {
        SlotError::BadKey(key.to_string())
      })?;

    let start = resolve_local(tz, naive)?;

    Ok(Slot::new(start, width))
  }
}

/// Directory holding every slot object
/// of one local day under `prefix`.
pub fn day_prefix(
  prefix: &str,
  day: NaiveDate
) -> String {
  let rel =
    format!("{}/", day.format("%Y/%m/%d"));
  join_prefix(prefix, &rel)
}

fn join_prefix(
  prefix: &str,
  rel: &str
) -> String {
  let prefix = prefix.trim_matches('/');
  if prefix.is_empty() {
    rel.to_string()
  } else {
    format!("{prefix}/{rel}")
  }
}

fn resolve_local(
  tz: Tz,
  naive: NaiveDateTime
) -> Result<DateTime<Tz>, SlotError> {
  tz.from_local_datetime(&naive)
    .earliest()
    .ok_or(
      SlotError::NonexistentLocalTime(naive)
    )
}

/// Whole seconds of a width that is
/// positive and divides a day.
pub fn validate_width(
  width: TimeDelta
) -> Result<i64, SlotError> {
  let secs = width.num_seconds();
  if secs <= 0 {
    return Err(
      SlotError::NonPositiveWidth(secs)
    );
  }
  if SECONDS_PER_DAY % secs != 0
    || width.subsec_nanos() != 0
  {
    return Err(SlotError::UnalignedWidth(
      secs
    ));
  }
  Ok(secs)
}

pub struct SlotCalendar;

impl SlotCalendar {
  /// Contiguous slots from `start`,
  /// stepping by `width`, for every
  /// start that is `<= end`. Empty when
  /// `end < start`.
  pub fn generate(
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    width: TimeDelta
  ) -> Result<Vec<Slot>, SlotError> {
    if width <= TimeDelta::zero() {
      return Err(
        SlotError::NonPositiveWidth(
          width.num_seconds()
        )
      );
    }

    let mut slots = Vec::new();

    let mut cursor = start;

    while cursor <= end {
      slots.push(Slot::new(cursor, width));
      cursor = cursor + width;
    }

    Ok(slots)
  }
}
