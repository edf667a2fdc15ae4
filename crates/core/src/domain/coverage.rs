//! Per-slot coverage classification and
//! the verification verdicts built on
//! it.

use std::collections::HashSet;

use chrono::{
  DateTime,
  TimeDelta,
  Utc
};

use super::record::Record;
use super::slot::Slot;

/// Aggregate of every record seen for
/// one slot, across one or more
/// objects.
#[derive(Debug, Clone, Default)]
pub struct SlotStats {
  pub lines:         usize,
  pub skipped_lines: usize,
  pub duplicate_ids: usize,
  pub ids:           HashSet<String>,
  pub min_created:   Option<DateTime<Utc>>,
  pub max_created:   Option<DateTime<Utc>>
}

impl SlotStats {
  pub fn observe(&mut self, rec: &Record) {
    self.lines += 1;

    if !self.ids.insert(rec.id.clone()) {
      self.duplicate_ids += 1;
    }

    self.min_created = Some(
      self
        .min_created
        .map_or(rec.created_at, |m| {
          m.min(rec.created_at)
        })
    );

    self.max_created = Some(
      self
        .max_created
        .map_or(rec.created_at, |m| {
          m.max(rec.created_at)
        })
    );
  }

  pub fn observe_skipped(&mut self) {
    self.lines += 1;
    self.skipped_lines += 1;
  }

  pub fn unique_ids(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct CoverageThresholds {
  pub min_unique_ids:  usize,
  pub start_tolerance: TimeDelta,
  pub end_tolerance:   TimeDelta
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageResult {
  pub slot_key:     String,
  pub unique_ids:   usize,
  pub has_data:     bool,
  pub covers_start: bool,
  pub covers_end:   bool,
  pub is_complete:  bool
}

impl CoverageResult {
  pub fn evaluate(
    slot: &Slot,
    stats: &SlotStats,
    th: &CoverageThresholds
  ) -> Self {
    let has_data =
      stats.unique_ids() > th.min_unique_ids;

    let covers_start = stats
      .min_created
      .is_some_and(|m| {
        m <= slot.start_utc() + th.start_tolerance
      });

    let covers_end =
      stats.max_created.is_some_and(|m| {
        m >= slot.end_utc() - th.end_tolerance
      });

    Self {
      slot_key: slot.key(),
      unique_ids: stats.unique_ids(),
      has_data,
      covers_start,
      covers_end,
      is_complete: has_data
        && covers_start
        && covers_end
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotVerdict {
  Ok,
  Warning(Vec<String>),
  Failure(String)
}

/// Classifies one slot after a
/// backfill. `original` is what the
/// pre-existing sources hold, `filled`
/// what the destination holds.
pub fn judge_slot(
  slot: &Slot,
  original: &SlotStats,
  filled: &SlotStats,
  early_coverage: TimeDelta
) -> SlotVerdict {
  if original.is_empty() && filled.is_empty()
  {
    return SlotVerdict::Failure(
      "no records in any source".into()
    );
  }

  let mut warnings = Vec::new();

  let shared = original
    .ids
    .intersection(&filled.ids)
    .count();

  if shared > 0 {
    warnings.push(format!(
      "{shared} ids present in both the \
       original sources and the destination"
    ));
  }

  let earliest = [
    original.min_created,
    filled.min_created
  ]
  .into_iter()
  .flatten()
  .min();

  if let Some(earliest) = earliest {
    let threshold =
      slot.start_utc() + early_coverage;
    if earliest > threshold {
      warnings.push(format!(
        "earliest record {} is later than \
         {}",
        earliest.to_rfc3339(),
        threshold.to_rfc3339()
      ));
    }
  }

  if warnings.is_empty() {
    SlotVerdict::Ok
  } else {
    SlotVerdict::Warning(warnings)
  }
}

#[derive(Debug, Clone, Default)]
pub struct VerificationSummary {
  pub checked:  usize,
  pub ok:       usize,
  pub warnings: Vec<(String, Vec<String>)>,
  pub failures: Vec<(String, String)>
}

impl VerificationSummary {
  pub fn record(
    &mut self,
    slot_key: String,
    verdict: SlotVerdict
  ) {
    self.checked += 1;
    match verdict {
      | SlotVerdict::Ok => self.ok += 1,
      | SlotVerdict::Warning(w) => {
        self.warnings.push((slot_key, w))
      }
      | SlotVerdict::Failure(f) => {
        self.failures.push((slot_key, f))
      }
    }
  }

  /// 0 when fully covered, 1 when any
  /// slot has no data, 2 when data is
  /// everywhere but with warnings.
  pub fn exit_code(&self) -> i32 {
    if !self.failures.is_empty() {
      1
    } else if !self.warnings.is_empty() {
      2
    } else {
      0
    }
  }
}
