//! Writes ready slots to the
//! destination, merging with whatever
//! is already stored under the key.
//!
//! Fresh records outside the slot are
//! dropped, as are records without
//! Japanese text unless the writer was
//! told to keep them.

use std::sync::Arc;

use tracing::{
  debug,
  info,
  warn
};

use super::accumulator::ReadySlot;
use crate::domain::model::SourceSpec;
use crate::domain::record::{
  Record,
  decode_jsonl,
  dedup_sorted,
  encode_jsonl,
  is_japanese
};
use crate::ports::store::{
  ObjectStore,
  StoreError
};

pub struct SlotWriter<O>
where
  O: ObjectStore + ?Sized
{
  store:         Arc<O>,
  destination:   SourceSpec,
  japanese_only: bool
}

impl<O> SlotWriter<O>
where
  O: ObjectStore + ?Sized
{
  pub fn new(
    store: Arc<O>,
    destination: SourceSpec
  ) -> Self {
    Self {
      store,
      destination,
      japanese_only: false
    }
  }

  pub fn japanese_only(mut self, on: bool) -> Self {
    self.japanese_only = on;
    self
  }

  fn keeps(&self, rec: &Record) -> bool {
    !self.japanese_only || rec.text().is_some_and(is_japanese)
  }

  /// Returns the number of records in
  /// the stored object after the write;
  /// nothing is stored when that is zero.
  pub async fn write(
    &self,
    ready: ReadySlot
  ) -> Result<usize, StoreError> {
    let key = ready
      .slot
      .object_key(&self.destination.prefix);

    let fetched = ready.records.len();

    let fresh: Vec<Record> = ready
      .records
      .into_iter()
      .filter(|r| ready.slot.contains(r.created_at))
      .filter(|r| self.keeps(r))
      .collect();

    if fresh.len() < fetched {
      debug!(
        slot = %ready.slot.key(),
        fetched,
        kept = fresh.len(),
        "filtered records before write"
      );
    }

    let existing = self
      .store
      .get(&self.destination.container, &key)
      .await?;

    let merged = match existing {
      | Some(body) => {
        let (prior, skipped) = decode_jsonl(&body);
        if skipped > 0 {
          warn!(
            key = %key,
            skipped,
            "dropping unparsable lines on merge"
          );
        }
        dedup_sorted(prior.into_iter().chain(fresh))
      }
      | None => dedup_sorted(fresh)
    };

    if merged.is_empty() {
      debug!(slot = %ready.slot.key(), "nothing to write");
      return Ok(0);
    }

    let body = encode_jsonl(&merged)
      .map_err(|e| StoreError::Backend(e.to_string()))?;

    self
      .store
      .put(&self.destination.container, &key, body)
      .await?;

    info!(
      slot = %ready.slot.key(),
      key = %key,
      records = merged.len(),
      covered = ready.covered,
      reflush = ready.reflush,
      "slot written"
    );

    Ok(merged.len())
  }
}
