mod common;

use chrono::{
  TimeDelta,
  TimeZone,
  Utc
};
use common::{
  TZ,
  at,
  t0
};
use gapfill_core::domain::slot::{
  Slot,
  SlotCalendar,
  SlotError,
  day_prefix
};

fn ten() -> TimeDelta {
  TimeDelta::minutes(10)
}

#[test]
fn calendar_keys_are_contiguous_and_bounded() {
  let start = t0();
  let end = t0() + TimeDelta::minutes(95);

  let slots = SlotCalendar::generate(start, end, ten()).unwrap();

  assert_eq!(slots.len(), 10);
  assert_eq!(slots[0].key(), "2024-01-01_00-00");
  assert_eq!(slots[9].key(), "2024-01-01_01-30");

  for pair in slots.windows(2) {
    assert!(pair[0].key() < pair[1].key());
    assert_eq!(pair[1].start - pair[0].start, ten());
    assert_eq!(pair[0].end(), pair[1].start);
  }

  assert!(slots.last().unwrap().start <= end);
}

#[test]
fn calendar_includes_slot_starting_exactly_at_end() {
  let slots =
    SlotCalendar::generate(t0(), t0() + ten(), ten()).unwrap();
  assert_eq!(slots.len(), 2);
}

#[test]
fn calendar_is_empty_when_end_precedes_start() {
  let slots =
    SlotCalendar::generate(t0(), t0() - ten(), ten()).unwrap();
  assert!(slots.is_empty());
}

#[test]
fn calendar_rejects_non_positive_width() {
  assert_eq!(
    SlotCalendar::generate(t0(), t0(), TimeDelta::zero()),
    Err(SlotError::NonPositiveWidth(0))
  );
  assert!(
    SlotCalendar::generate(t0(), t0(), TimeDelta::minutes(-5))
      .is_err()
  );
}

#[test]
fn containing_floors_to_local_slot_grid() {
  let slot = Slot::containing(at(27, 41), ten(), TZ).unwrap();
  assert_eq!(slot.key(), "2024-01-01_00-20");
  assert!(slot.contains(at(27, 41)));
  assert!(!slot.contains(at(30, 0)));
}

#[test]
fn containing_uses_local_day_not_utc() {
  // 2023-12-31 15:05 UTC is 00:05 on
  // Jan 1st in Tokyo.
  let t = Utc.with_ymd_and_hms(2023, 12, 31, 15, 5, 0).unwrap();
  let slot = Slot::containing(t, ten(), TZ).unwrap();
  assert_eq!(slot.key(), "2024-01-01_00-00");
  assert_eq!(
    slot.object_key("notes"),
    "notes/2024/01/01/00/2024-01-01_00-00.jsonl"
  );
}

#[test]
fn containing_rejects_width_that_does_not_divide_a_day() {
  assert_eq!(
    Slot::containing(at(0, 0), TimeDelta::minutes(7), TZ),
    Err(SlotError::UnalignedWidth(420))
  );
}

#[test]
fn key_round_trips_through_from_key() {
  let slot = Slot::from_key("2024-01-01_13-40", ten(), TZ).unwrap();
  assert_eq!(slot.key(), "2024-01-01_13-40");
  assert_eq!(slot.next().key(), "2024-01-01_13-50");
  assert_eq!(slot.prev().key(), "2024-01-01_13-30");
  assert!(Slot::from_key("2024-01-01 13:40", ten(), TZ).is_err());
}

#[test]
fn prefixes_tolerate_missing_or_slashed_prefix() {
  let day = t0().date_naive();
  assert_eq!(day_prefix("", day), "2024/01/01/");
  assert_eq!(day_prefix("/notes/", day), "notes/2024/01/01/");
}
