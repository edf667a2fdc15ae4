//! Boundary ids for grouped periods,
//! read from the neighbouring slot
//! objects.

use tracing::debug;

use super::inventory::Inventory;
use crate::domain::period::{
  Period,
  PeriodGrouper
};
use crate::domain::slot::Slot;
use crate::ports::store::ObjectStore;

/// `since_id` is the last record of the
/// slot before the period, `until_id`
/// the first record of the slot after
/// it. Stored objects are ascending, so
/// these bracket the gap.
pub async fn resolve_boundaries<O>(
  inventory: &mut Inventory<O>,
  period: &mut Period
) where
  O: ObjectStore + ?Sized
{
  let before = period.start_slot.prev();
  let after = period.end_slot.next();

  period.since_id = inventory
    .first_records(&before)
    .await
    .last()
    .map(|r| r.id.clone());

  period.until_id = inventory
    .first_records(&after)
    .await
    .first()
    .map(|r| r.id.clone());

  debug!(
    start = %period.start_slot.key(),
    end = %period.end_slot.key(),
    since_id = ?period.since_id,
    until_id = ?period.until_id,
    "resolved period boundaries"
  );
}

/// Groups missing slots and annotates
/// each period with boundary ids.
pub async fn plan_periods<O>(
  inventory: &mut Inventory<O>,
  missing: &[Slot]
) -> Vec<Period>
where
  O: ObjectStore + ?Sized
{
  let mut periods = PeriodGrouper::group(missing);
  for p in &mut periods {
    resolve_boundaries(inventory, p).await;
  }
  periods
}
