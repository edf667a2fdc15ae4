//! Post-write checks: which slots still
//! lack a valid object, per-slot
//! coverage, and the verification pass
//! behind the 0/1/2 exit codes.

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{
  info,
  warn
};

use super::inventory::Inventory;
use crate::domain::coverage::{
  CoverageResult,
  CoverageThresholds,
  SlotVerdict,
  VerificationSummary,
  judge_slot
};
use crate::domain::model::{
  SourceSpec,
  ValidityBounds
};
use crate::domain::slot::Slot;
use crate::ports::store::ObjectStore;

pub struct CoverageVerifier<O>
where
  O: ObjectStore + ?Sized
{
  inventory: Inventory<O>
}

impl<O> CoverageVerifier<O>
where
  O: ObjectStore + ?Sized
{
  /// `sources` should already include
  /// the destination that was written.
  pub fn new(
    store: Arc<O>,
    sources: Vec<SourceSpec>,
    bounds: ValidityBounds
  ) -> Self {
    Self {
      inventory: Inventory::new(store, sources, bounds)
    }
  }

  /// Slots still absent or invalid.
  /// Re-lists storage on every call.
  pub async fn remaining_gaps(
    &mut self,
    slots: &[Slot]
  ) -> Vec<Slot> {
    self.inventory.refresh();

    let gaps = self.inventory.missing(slots).await;

    if gaps.is_empty() {
      info!(
        slots = slots.len(),
        "all slots resolve"
      );
    } else {
      warn!(
        slots = slots.len(),
        remaining = gaps.len(),
        first = %gaps[0].key(),
        "gaps remain after backfill"
      );
    }

    gaps
  }
}

/// Coverage of each slot aggregated
/// over every object in `inventory`.
pub async fn coverage_report<O>(
  inventory: &mut Inventory<O>,
  slots: &[Slot],
  thresholds: &CoverageThresholds
) -> Vec<CoverageResult>
where
  O: ObjectStore + ?Sized
{
  let mut out = Vec::with_capacity(slots.len());
  for slot in slots {
    let stats = inventory.stats(slot).await;
    out.push(CoverageResult::evaluate(
      slot, &stats, thresholds
    ));
  }
  out
}

/// Judges every slot against the
/// original sources and the
/// destination separately.
pub async fn verify_slots<O>(
  store: Arc<O>,
  sources: Vec<SourceSpec>,
  destination: SourceSpec,
  bounds: ValidityBounds,
  slots: &[Slot],
  early_coverage: TimeDelta
) -> VerificationSummary
where
  O: ObjectStore + ?Sized
{
  let original_sources: Vec<SourceSpec> = sources
    .into_iter()
    .filter(|s| *s != destination)
    .collect();

  let mut original =
    Inventory::new(Arc::clone(&store), original_sources, bounds);

  let mut filled =
    Inventory::new(store, vec![destination], bounds);

  let mut summary = VerificationSummary::default();

  for slot in slots {
    let orig = original.stats(slot).await;
    let dest = filled.stats(slot).await;

    let verdict =
      judge_slot(slot, &orig, &dest, early_coverage);

    match &verdict {
      | SlotVerdict::Ok => {}
      | SlotVerdict::Warning(w) => {
        warn!(
          slot = %slot.key(),
          warnings = %w.join("; "),
          "slot verified with warnings"
        );
      }
      | SlotVerdict::Failure(f) => {
        warn!(
          slot = %slot.key(),
          reason = %f,
          "slot failed verification"
        );
      }
    }

    summary.record(slot.key(), verdict);
  }

  info!(
    checked = summary.checked,
    ok = summary.ok,
    warnings = summary.warnings.len(),
    failures = summary.failures.len(),
    "verification finished"
  );

  summary
}
