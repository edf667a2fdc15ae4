mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::TimeDelta;
use common::{
  BrokenListing,
  MemStore,
  jsonl,
  slot_notes,
  t0
};
use gapfill_core::app::inventory::{
  Inventory,
  SlotState
};
use gapfill_core::domain::model::{
  SourceSpec,
  ValidityBounds
};
use gapfill_core::domain::slot::{
  Slot,
  SlotCalendar
};

const BOUNDS: ValidityBounds = ValidityBounds {
  min_lines: 3,
  max_lines: 10
};

fn source(container: &str) -> SourceSpec {
  SourceSpec {
    container: container.to_string(),
    prefix:    "notes".to_string()
  }
}

fn slot(minutes: i64) -> Slot {
  Slot::new(
    t0() + TimeDelta::minutes(minutes),
    TimeDelta::minutes(10)
  )
}

fn put_slot(store: &MemStore, container: &str, minutes: i64, lines: u32) {
  let s = slot(minutes);
  store.insert(
    container,
    &s.object_key("notes"),
    jsonl(&slot_notes(minutes, lines))
  );
}

#[tokio::test]
async fn validity_follows_line_bounds() {
  let store = Arc::new(MemStore::new());
  put_slot(&store, "primary", 0, 3);
  put_slot(&store, "primary", 10, 4);
  put_slot(&store, "primary", 20, 10);
  put_slot(&store, "primary", 30, 11);

  let mut inv =
    Inventory::new(store, vec![source("primary")], BOUNDS);

  assert_eq!(inv.slot_state(&slot(0)).await, SlotState::PresentInvalid);
  assert_eq!(inv.slot_state(&slot(10)).await, SlotState::PresentValid);
  assert_eq!(inv.slot_state(&slot(20)).await, SlotState::PresentValid);
  assert_eq!(inv.slot_state(&slot(30)).await, SlotState::PresentInvalid);
  assert_eq!(inv.slot_state(&slot(40)).await, SlotState::Absent);
}

#[tokio::test]
async fn oversized_objects_are_not_read_to_the_end() {
  let store = Arc::new(MemStore::new());
  put_slot(&store, "primary", 0, 500);

  let mut inv = Inventory::new(
    Arc::clone(&store),
    vec![source("primary")],
    BOUNDS
  );

  assert_eq!(inv.slot_state(&slot(0)).await, SlotState::PresentInvalid);

  let read = store.lines_read.load(Ordering::SeqCst);
  assert_eq!(read, BOUNDS.max_lines + 1);
}

#[tokio::test]
async fn validation_and_listing_are_memoized_until_refresh() {
  let store = Arc::new(MemStore::new());
  put_slot(&store, "primary", 0, 5);

  let mut inv = Inventory::new(
    Arc::clone(&store),
    vec![source("primary")],
    BOUNDS
  );

  inv.slot_state(&slot(0)).await;
  let lines_after_first = store.lines_read.load(Ordering::SeqCst);
  let lists_after_first = store.lists.load(Ordering::SeqCst);

  inv.slot_state(&slot(0)).await;
  inv.slot_state(&slot(10)).await;
  assert_eq!(store.lines_read.load(Ordering::SeqCst), lines_after_first);
  assert_eq!(store.lists.load(Ordering::SeqCst), lists_after_first);

  let refs = inv.candidates(&slot(0)).await;
  assert_eq!(refs.len(), 1);
  assert_eq!(refs[0].line_count, Some(5));
  assert_eq!(refs[0].valid, Some(true));

  // A new object appears underneath the
  // cached listing.
  put_slot(&store, "primary", 10, 5);
  assert_eq!(inv.slot_state(&slot(10)).await, SlotState::Absent);

  inv.refresh();
  assert_eq!(inv.cached_days(), 0);
  assert_eq!(inv.slot_state(&slot(10)).await, SlotState::PresentValid);
}

#[tokio::test]
async fn any_valid_candidate_across_sources_wins() {
  let store = Arc::new(MemStore::new());
  put_slot(&store, "primary", 0, 1);
  put_slot(&store, "mirror", 0, 6);

  let mut inv = Inventory::new(
    store,
    vec![source("primary"), source("mirror")],
    BOUNDS
  );

  assert_eq!(inv.candidates(&slot(0)).await.len(), 2);
  assert_eq!(inv.slot_state(&slot(0)).await, SlotState::PresentValid);
}

#[tokio::test]
async fn listing_failure_degrades_to_other_sources() {
  let inner = Arc::new(MemStore::new());
  put_slot(&inner, "primary", 0, 6);
  put_slot(&inner, "mirror", 10, 6);

  let store = Arc::new(BrokenListing {
    inner,
    broken: "primary".to_string()
  });

  let mut inv = Inventory::new(
    store,
    vec![source("primary"), source("mirror")],
    BOUNDS
  );

  assert_eq!(inv.slot_state(&slot(0)).await, SlotState::Absent);
  assert_eq!(inv.slot_state(&slot(10)).await, SlotState::PresentValid);
}

#[tokio::test]
async fn gap_detection_is_idempotent() {
  let store = Arc::new(MemStore::new());
  for m in [0, 10, 40] {
    put_slot(&store, "primary", m, 6);
  }
  put_slot(&store, "primary", 30, 1);

  let slots = SlotCalendar::generate(
    t0(),
    t0() + TimeDelta::minutes(50),
    TimeDelta::minutes(10)
  )
  .unwrap();

  let keys = |v: Vec<Slot>| {
    v.iter().map(|s| s.key()).collect::<Vec<_>>()
  };

  let mut first =
    Inventory::new(Arc::clone(&store), vec![source("primary")], BOUNDS);
  let mut second =
    Inventory::new(Arc::clone(&store), vec![source("primary")], BOUNDS);

  let a = keys(first.missing(&slots).await);
  let b = keys(second.missing(&slots).await);
  let c = keys(first.missing(&slots).await);

  assert_eq!(
    a,
    vec![
      "2024-01-01_00-20",
      "2024-01-01_00-30",
      "2024-01-01_00-50"
    ]
  );
  assert_eq!(a, b);
  assert_eq!(a, c);
}

#[tokio::test]
async fn stats_aggregate_duplicates_and_bounds() {
  let store = Arc::new(MemStore::new());
  let notes = slot_notes(0, 4);
  store.insert("primary", &slot(0).object_key("notes"), jsonl(&notes));
  store.insert(
    "mirror",
    &slot(0).object_key("notes"),
    jsonl(&notes[..2])
  );

  let mut inv = Inventory::new(
    store,
    vec![source("primary"), source("mirror")],
    BOUNDS
  );

  let stats = inv.stats(&slot(0)).await;
  assert_eq!(stats.lines, 6);
  assert_eq!(stats.unique_ids(), 4);
  assert_eq!(stats.duplicate_ids, 2);
  assert_eq!(stats.min_created, Some(slot(0).start_utc()));
}
