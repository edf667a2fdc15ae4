mod common;

use chrono::TimeDelta;
use common::{
  TZ,
  at,
  id_for,
  note
};
use gapfill_core::app::accumulator::{
  ReadySlot,
  SlotAccumulator
};
use gapfill_core::domain::record::Record;

fn acc() -> SlotAccumulator {
  SlotAccumulator::new(
    TimeDelta::minutes(10),
    TZ,
    TimeDelta::seconds(30),
    2
  )
}

fn rec(minutes: i64, seconds: i64) -> Record {
  let t = at(minutes, seconds);
  Record::from_value(note(&id_for(t, 0), t)).unwrap()
}

/// Records every minute over `[from, to)`
/// minutes, newest first, the way a
/// backward walk delivers them.
fn backward(from: i64, to: i64) -> Vec<Record> {
  (from..to).rev().map(|m| rec(m, 0)).collect()
}

#[test]
fn middle_slot_leaves_first_with_margin_on_both_sides() {
  let mut a = acc();

  let mut released: Vec<ReadySlot> = Vec::new();

  for r in backward(0, 50) {
    released.extend(a.push(r));
  }

  let keys: Vec<String> =
    released.iter().map(|r| r.slot.key()).collect();
  assert_eq!(keys, vec!["2024-01-01_00-20"]);

  let slot = released[0].slot;
  assert_eq!(released[0].records.len(), 10);
  assert!(released[0].covered);
  assert!(!released[0].reflush);

  let older = [slot.prev(), slot.prev().prev()];
  let newer = [slot.next(), slot.next().next()];
  assert!(older.iter().all(|s| a.is_covered(s)));
  assert!(newer.iter().all(|s| a.is_covered(s)));

  let rest = a.drain_all();
  let keys: Vec<String> =
    rest.iter().map(|r| r.slot.key()).collect();
  assert_eq!(
    keys,
    vec![
      "2024-01-01_00-40",
      "2024-01-01_00-30",
      "2024-01-01_00-10",
      "2024-01-01_00-00",
    ]
  );
  assert!(rest.iter().all(|r| r.records.len() == 10));
  assert_eq!(a.buffered_slots(), 0);
}

#[test]
fn released_records_are_deduplicated_and_ascending() {
  let mut a = acc();

  let mut feed = backward(0, 10);
  feed.insert(3, rec(6, 0));

  for r in feed {
    assert!(a.push(r).is_empty());
  }

  let out = a.drain_all();
  assert_eq!(out.len(), 1);

  let records = &out[0].records;
  assert_eq!(records.len(), 10);
  assert!(
    records
      .windows(2)
      .all(|w| w[0].created_at < w[1].created_at)
  );
}

#[test]
fn uncovered_slot_waits_for_drain() {
  let mut a = acc();

  // The walk never gets within the
  // tolerance of 00:00.
  for r in backward(5, 30) {
    assert!(a.push(r).is_empty());
  }

  let out = a.drain_all();
  let first = out.last().unwrap();

  assert_eq!(first.slot.key(), "2024-01-01_00-00");
  assert!(!first.covered);
  assert_eq!(first.records.len(), 5);
}

#[test]
fn late_record_reopens_a_written_slot() {
  let mut a = acc();

  for r in backward(0, 50) {
    a.push(r);
  }

  let late = rec(25, 30);
  let again = a.push(late.clone());

  assert_eq!(again.len(), 1);
  assert_eq!(again[0].slot.key(), "2024-01-01_00-20");
  assert!(again[0].reflush);
  assert_eq!(again[0].records, vec![late]);
}

#[test]
fn running_minimum_tracks_the_oldest_record() {
  let mut a = acc();

  assert_eq!(a.running_min(), None);

  a.push(rec(12, 0));
  a.push(rec(15, 0));
  a.push(rec(11, 30));

  assert_eq!(a.running_min(), Some(at(11, 30)));
  assert_eq!(a.buffered_slots(), 1);
  assert_eq!(a.dropped(), 0);
}
