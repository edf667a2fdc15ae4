//! Buckets streamed records into slots
//! and decides when a bucket is safe to
//! write.
//!
//! A slot is covered once the running
//! minimum `created_at` of the walk is
//! at or below `start + tolerance`. It
//! becomes ready only when at least
//! `lag` covered slots lie on each side
//! of it: the older ones give margin
//! for stragglers from the same walk,
//! the newer ones bound how early a
//! bucket can leave.

use std::collections::{
  BTreeMap,
  BTreeSet,
  HashSet
};

use chrono::{
  DateTime,
  TimeDelta,
  Utc
};
use chrono_tz::Tz;
use tracing::{
  debug,
  warn
};

use crate::domain::record::{
  Record,
  dedup_sorted
};
use crate::domain::slot::Slot;

#[derive(Debug, Clone)]
pub struct ReadySlot {
  pub slot:    Slot,
  pub records: Vec<Record>,
  pub covered: bool,
  /// The slot was written before; the
  /// writer must merge, not replace.
  pub reflush: bool
}

#[derive(Debug)]
struct Buffer {
  slot:    Slot,
  records: Vec<Record>,
  covered: bool,
  reflush: bool
}

pub struct SlotAccumulator {
  width:       TimeDelta,
  tz:          Tz,
  tolerance:   TimeDelta,
  lag:         usize,
  buffers:     BTreeMap<DateTime<Utc>, Buffer>,
  covered:     BTreeSet<DateTime<Utc>>,
  flushed:     HashSet<DateTime<Utc>>,
  running_min: Option<DateTime<Utc>>,
  dropped:     usize
}

impl SlotAccumulator {
  pub fn new(
    width: TimeDelta,
    tz: Tz,
    tolerance: TimeDelta,
    lag: usize
  ) -> Self {
    Self {
      width,
      tz,
      tolerance,
      lag,
      buffers: BTreeMap::new(),
      covered: BTreeSet::new(),
      flushed: HashSet::new(),
      running_min: None,
      dropped: 0
    }
  }

  pub fn running_min(&self) -> Option<DateTime<Utc>> {
    self.running_min
  }

  pub fn buffered_slots(&self) -> usize {
    self.buffers.len()
  }

  pub fn dropped(&self) -> usize {
    self.dropped
  }

  pub fn is_covered(&self, slot: &Slot) -> bool {
    self.covered.contains(&slot.start_utc())
  }

  /// Buffers one record and returns the
  /// slots that became ready, newest
  /// first.
  pub fn push(&mut self, rec: Record) -> Vec<ReadySlot> {
    let slot = match Slot::containing(
      rec.created_at,
      self.width,
      self.tz
    ) {
      | Ok(s) => s,
      | Err(e) => {
        warn!(
          id = %rec.id,
          error = %e,
          "cannot classify record"
        );
        self.dropped += 1;
        return Vec::new();
      }
    };

    let key = slot.start_utc();

    let reflush = self.flushed.contains(&key);

    let buffer =
      self.buffers.entry(key).or_insert_with(|| {
        if reflush {
          debug!(
            slot = %slot.key(),
            "late record for written slot"
          );
        }
        Buffer {
          slot,
          records: Vec::new(),
          covered: false,
          reflush
        }
      });

    let created_at = rec.created_at;

    buffer.records.push(rec);

    self.running_min = Some(
      self
        .running_min
        .map_or(created_at, |m| m.min(created_at))
    );

    self.mark_covered();

    self.take_ready()
  }

  fn mark_covered(&mut self) {
    let Some(min) = self.running_min else {
      return;
    };

    for (start, buf) in self.buffers.iter_mut().rev() {
      if buf.covered {
        continue;
      }
      if min <= *start + self.tolerance {
        buf.covered = true;
        self.covered.insert(*start);
        debug!(
          slot = %buf.slot.key(),
          "slot covered"
        );
      }
    }
  }

  fn take_ready(&mut self) -> Vec<ReadySlot> {
    let ready: Vec<DateTime<Utc>> = self
      .buffers
      .iter()
      .rev()
      .filter(|(start, buf)| {
        buf.covered && self.has_margin(**start)
      })
      .map(|(start, _)| *start)
      .collect();

    ready
      .into_iter()
      .filter_map(|start| self.release(start))
      .collect()
  }

  fn has_margin(&self, start: DateTime<Utc>) -> bool {
    let older = self.covered.range(..start).count();
    let newer = self
      .covered
      .range(start..)
      .filter(|s| **s != start)
      .count();
    older >= self.lag && newer >= self.lag
  }

  fn release(
    &mut self,
    start: DateTime<Utc>
  ) -> Option<ReadySlot> {
    let buf = self.buffers.remove(&start)?;

    self.flushed.insert(start);

    Some(ReadySlot {
      slot:    buf.slot,
      records: dedup_sorted(buf.records),
      covered: buf.covered,
      reflush: buf.reflush
    })
  }

  /// Releases every buffer regardless of
  /// coverage, newest first. Used on
  /// stream end, error or interrupt.
  pub fn drain_all(&mut self) -> Vec<ReadySlot> {
    let starts: Vec<DateTime<Utc>> =
      self.buffers.keys().rev().copied().collect();

    starts
      .into_iter()
      .filter_map(|start| self.release(start))
      .collect()
  }
}
