//! Answers "does a valid object exist
//! for this slot" across one or more
//! storage locations.
//!
//! Listings are cached per local day
//! and validation results per object,
//! both for the lifetime of one
//! `Inventory` or until `refresh`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::StreamExt;
use tracing::{
  debug,
  warn
};

use crate::domain::coverage::SlotStats;
use crate::domain::model::{
  SourceSpec,
  ValidityBounds
};
use crate::domain::record::{
  Record,
  decode_jsonl
};
use crate::domain::slot::{
  Slot,
  day_prefix
};
use crate::ports::store::{
  ObjectStore,
  StoreError
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
  Absent,
  PresentInvalid,
  PresentValid
}

/// A candidate object for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
  pub container:  String,
  pub key:        String,
  pub line_count: Option<usize>,
  pub valid:      Option<bool>
}

/// Per-day grouping of candidate
/// objects by slot key.
#[derive(Debug, Default)]
pub struct DayCache {
  days: HashMap<
    NaiveDate,
    HashMap<String, Vec<ArtifactRef>>
  >
}

impl DayCache {
  pub fn get(
    &self,
    day: NaiveDate
  ) -> Option<&HashMap<String, Vec<ArtifactRef>>>
  {
    self.days.get(&day)
  }

  pub fn insert(
    &mut self,
    day: NaiveDate,
    grouped: HashMap<String, Vec<ArtifactRef>>
  ) {
    self.days.insert(day, grouped);
  }

  pub fn invalidate(&mut self) {
    self.days.clear();
  }

  pub fn len(&self) -> usize {
    self.days.len()
  }

  pub fn is_empty(&self) -> bool {
    self.days.is_empty()
  }
}

#[derive(Debug, Clone, Copy)]
struct Validation {
  line_count: usize,
  valid:      bool
}

pub struct Inventory<O>
where
  O: ObjectStore + ?Sized
{
  store:     Arc<O>,
  sources:   Vec<SourceSpec>,
  bounds:    ValidityBounds,
  days:      DayCache,
  validated: HashMap<(String, String), Validation>
}

impl<O> Inventory<O>
where
  O: ObjectStore + ?Sized
{
  pub fn new(
    store: Arc<O>,
    sources: Vec<SourceSpec>,
    bounds: ValidityBounds
  ) -> Self {
    Self {
      store,
      sources,
      bounds,
      days: DayCache::default(),
      validated: HashMap::new()
    }
  }

  /// Drops every cached listing and
  /// validation result.
  pub fn refresh(&mut self) {
    self.days.invalidate();
    self.validated.clear();
  }

  pub fn cached_days(&self) -> usize {
    self.days.len()
  }

  async fn ensure_day(&mut self, day: NaiveDate) {
    if self.days.get(day).is_some() {
      return;
    }

    let mut grouped: HashMap<
      String,
      Vec<ArtifactRef>
    > = HashMap::new();

    for source in &self.sources {
      let prefix = day_prefix(&source.prefix, day);

      let objects = match self
        .store
        .list(&source.container, &prefix)
        .await
      {
        | Ok(o) => o,
        | Err(e) => {
          warn!(
            container = %source.container,
            prefix = %prefix,
            error = %e,
            "listing failed, treating source \
             as empty"
          );
          continue;
        }
      };

      for obj in objects {
        let Some(slot_key) = slot_key_of(&obj.key)
        else {
          continue;
        };

        grouped.entry(slot_key).or_default().push(
          ArtifactRef {
            container:  source.container.clone(),
            key:        obj.key,
            line_count: None,
            valid:      None
          }
        );
      }
    }

    debug!(
      day = %day,
      slots = grouped.len(),
      "cached day listing"
    );

    self.days.insert(day, grouped);
  }

  /// Candidate objects for a slot, with
  /// any validation already known.
  pub async fn candidates(
    &mut self,
    slot: &Slot
  ) -> Vec<ArtifactRef> {
    let day = slot.day();

    self.ensure_day(day).await;

    let mut refs = self
      .days
      .get(day)
      .and_then(|g| g.get(&slot.key()))
      .cloned()
      .unwrap_or_default();

    for r in &mut refs {
      if let Some(v) = self
        .validated
        .get(&(r.container.clone(), r.key.clone()))
      {
        r.line_count = Some(v.line_count);
        r.valid = Some(v.valid);
      }
    }

    refs
  }

  pub async fn slot_state(
    &mut self,
    slot: &Slot
  ) -> SlotState {
    let refs = self.candidates(slot).await;

    if refs.is_empty() {
      return SlotState::Absent;
    }

    for r in &refs {
      if self.validate(&r.container, &r.key).await {
        return SlotState::PresentValid;
      }
    }

    SlotState::PresentInvalid
  }

  /// Slots that are absent or only have
  /// invalid objects, in input order.
  pub async fn missing(
    &mut self,
    slots: &[Slot]
  ) -> Vec<Slot> {
    let mut out = Vec::new();
    for slot in slots {
      if self.slot_state(slot).await
        != SlotState::PresentValid
      {
        out.push(*slot);
      }
    }
    out
  }

  async fn validate(
    &mut self,
    container: &str,
    key: &str
  ) -> bool {
    let id = (container.to_string(), key.to_string());

    if let Some(v) = self.validated.get(&id) {
      return v.valid;
    }

    let v = match count_lines(
      self.store.as_ref(),
      container,
      key,
      self.bounds.max_lines
    )
    .await
    {
      | Ok(n) => {
        Validation {
          line_count: n,
          valid:      self.bounds.accepts(n)
        }
      }
      | Err(e) => {
        warn!(
          container,
          key,
          error = %e,
          "cannot read object, treating as \
           invalid"
        );
        Validation {
          line_count: 0,
          valid:      false
        }
      }
    };

    debug!(
      container,
      key,
      lines = v.line_count,
      valid = v.valid,
      "validated object"
    );

    self.validated.insert(id, v);

    v.valid
  }

  /// Aggregates every record of every
  /// candidate object for a slot.
  pub async fn stats(
    &mut self,
    slot: &Slot
  ) -> SlotStats {
    let refs = self.candidates(slot).await;

    let mut stats = SlotStats::default();

    for r in refs {
      if let Err(e) = read_into(
        self.store.as_ref(),
        &r.container,
        &r.key,
        &mut stats
      )
      .await
      {
        warn!(
          container = %r.container,
          key = %r.key,
          error = %e,
          "cannot read object"
        );
      }
    }

    stats
  }

  /// Records of the first candidate
  /// object that has any, in file
  /// order.
  pub async fn first_records(
    &mut self,
    slot: &Slot
  ) -> Vec<Record> {
    for r in self.candidates(slot).await {
      match self.store.get(&r.container, &r.key).await
      {
        | Ok(Some(body)) => {
          let (records, _) = decode_jsonl(&body);
          if !records.is_empty() {
            return records;
          }
        }
        | Ok(None) => {}
        | Err(e) => {
          warn!(
            container = %r.container,
            key = %r.key,
            error = %e,
            "cannot read object"
          );
        }
      }
    }
    Vec::new()
  }
}

/// Slot key from a `.jsonl` object key:
/// the file stem.
fn slot_key_of(key: &str) -> Option<String> {
  let path = Path::new(key);
  if path.extension()? != "jsonl" {
    return None;
  }
  path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
}

/// Counts non-empty lines, stopping as
/// soon as the count exceeds `cap`.
pub async fn count_lines<O>(
  store: &O,
  container: &str,
  key: &str,
  cap: usize
) -> Result<usize, StoreError>
where
  O: ObjectStore + ?Sized
{
  let mut lines = store.lines(container, key).await?;

  let mut count = 0;

  while let Some(line) = lines.next().await {
    if line?.trim().is_empty() {
      continue;
    }
    count += 1;
    if count > cap {
      break;
    }
  }

  Ok(count)
}

async fn read_into<O>(
  store: &O,
  container: &str,
  key: &str,
  stats: &mut SlotStats
) -> Result<(), StoreError>
where
  O: ObjectStore + ?Sized
{
  let mut lines = store.lines(container, key).await?;

  while let Some(line) = lines.next().await {
    let line = line?;
    if line.trim().is_empty() {
      continue;
    }
    match Record::parse_line(&line) {
      | Some(rec) => stats.observe(&rec),
      | None => stats.observe_skipped()
    }
  }

  Ok(())
}
