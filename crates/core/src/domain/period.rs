//! Contiguous runs of missing slots and
//! the plain-text period file.

use chrono::{
  DateTime,
  TimeDelta,
  Utc
};
use chrono_tz::Tz;
use thiserror::Error;

use super::slot::{
  Slot,
  SlotCalendar,
  SlotError
};

#[derive(Debug, Clone, PartialEq)]
pub struct Period {
  pub start_slot: Slot,
  pub end_slot:   Slot,
  pub since_id:   Option<String>,
  pub until_id:   Option<String>
}

impl Period {
  pub fn single(slot: Slot) -> Self {
    Self {
      start_slot: slot,
      end_slot:   slot,
      since_id:   None,
      until_id:   None
    }
  }

  /// Serialized identity used as the
  /// progress-file key.
  pub fn key(&self) -> String {
    format!(
      "{},{},{},{}",
      self.start_slot.key(),
      self.end_slot.key(),
      self.since_id.as_deref().unwrap_or(""),
      self.until_id.as_deref().unwrap_or("")
    )
  }

  pub fn window_start(&self) -> DateTime<Utc> {
    self.start_slot.start_utc()
  }

  pub fn window_end(&self) -> DateTime<Utc> {
    self.end_slot.end_utc()
  }

  pub fn slots(&self) -> Vec<Slot> {
    SlotCalendar::generate(
      self.start_slot.start,
      self.end_slot.start,
      self.start_slot.width
    )
    .unwrap_or_default()
  }
}

pub struct PeriodGrouper;

impl PeriodGrouper {
  /// Collapses ascending slots into
  /// maximal runs where each slot starts
  /// exactly at the previous one's end.
  /// Boundary ids are left empty.
  pub fn group(slots: &[Slot]) -> Vec<Period> {
    let mut periods = Vec::new();

    let mut iter = slots.iter();

    let Some(first) = iter.next() else {
      return periods;
    };

    let mut current = Period::single(*first);

    for slot in iter {
      if slot.start == current.end_slot.end() {
        current.end_slot = *slot;
      } else {
        periods.push(current);
        current = Period::single(*slot);
      }
    }

    periods.push(current);

    periods
  }

  pub fn group_keys(
    keys: &[String],
    width: TimeDelta,
    tz: Tz
  ) -> Result<Vec<Period>, SlotError> {
    let mut slots = keys
      .iter()
      .map(|k| Slot::from_key(k, width, tz))
      .collect::<Result<Vec<_>, _>>()?;

    slots.sort_by_key(|s| s.start);
    slots.dedup();

    Ok(Self::group(&slots))
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodFileError {
  #[error(
    "line {line}: expected at least two \
     comma-separated slot keys"
  )]
  TooFewColumns { line: usize },
  #[error("line {line}: {source}")]
  Slot {
    line:   usize,
    #[source]
    source: SlotError
  },
  #[error(
    "line {line}: end slot precedes start \
     slot"
  )]
  Reversed { line: usize }
}

/// Parses `start,end[,since,until]`
/// lines; blank lines and `#` comments
/// are ignored.
pub fn parse_period_file(
  content: &str,
  width: TimeDelta,
  tz: Tz
) -> Result<Vec<Period>, PeriodFileError> {
  let mut periods = Vec::new();

  for (idx, raw_line) in
    content.lines().enumerate()
  {
    let line = idx + 1;

    let trimmed = raw_line.trim();

    if trimmed.is_empty()
      || trimmed.starts_with('#')
    {
      continue;
    }

    let cols: Vec<&str> =
      trimmed.split(',').map(str::trim).collect();

    if cols.len() < 2 {
      return Err(
        PeriodFileError::TooFewColumns {
          line
        }
      );
    }

    let parse = |k: &str| {
      Slot::from_key(k, width, tz).map_err(
        |source| PeriodFileError::Slot {
          line,
          source
        }
      )
    };

    let start_slot = parse(cols[0])?;
    let end_slot = parse(cols[1])?;

    if end_slot.start < start_slot.start {
      return Err(PeriodFileError::Reversed {
        line
      });
    }

    let id_at = |i: usize| {
      cols
        .get(i)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
    };

    periods.push(Period {
      start_slot,
      end_slot,
      since_id: id_at(2),
      until_id: id_at(3)
    });
  }

  Ok(periods)
}

pub fn format_period_file(
  periods: &[Period]
) -> String {
  let mut out = String::from(
    "# start_slot,end_slot,since_id,until_id\n"
  );
  for p in periods {
    out.push_str(&p.key());
    out.push('\n');
  }
  out
}
