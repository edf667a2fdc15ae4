mod common;

use std::sync::Arc;

use chrono::TimeDelta;
use common::{
  MemStore,
  at,
  id_for,
  jsonl,
  note,
  slot_notes,
  t0
};
use gapfill_core::app::inventory::Inventory;
use gapfill_core::app::verifier::{
  coverage_report,
  verify_slots
};
use gapfill_core::domain::coverage::{
  CoverageResult,
  CoverageThresholds,
  SlotStats,
  SlotVerdict,
  VerificationSummary,
  judge_slot
};
use gapfill_core::domain::model::{
  SourceSpec,
  ValidityBounds
};
use gapfill_core::domain::record::Record;
use gapfill_core::domain::slot::Slot;
use serde_json::Value;

const BOUNDS: ValidityBounds = ValidityBounds {
  min_lines: 3,
  max_lines: 50
};

fn slot(minutes: i64) -> Slot {
  Slot::new(t0() + TimeDelta::minutes(minutes), TimeDelta::minutes(10))
}

fn primary() -> SourceSpec {
  SourceSpec {
    container: "primary".into(),
    prefix:    "notes".into()
  }
}

fn dest() -> SourceSpec {
  SourceSpec {
    container: "backfill".into(),
    prefix:    "notes".into()
  }
}

fn stats_of(values: &[Value]) -> SlotStats {
  let mut s = SlotStats::default();
  for v in values {
    s.observe(&Record::from_value(v.clone()).unwrap());
  }
  s
}

fn put(store: &MemStore, spec: &SourceSpec, s: &Slot, values: &[Value]) {
  store.insert(&spec.container, &s.object_key(&spec.prefix), jsonl(values));
}

#[test]
fn coverage_needs_ids_and_both_edges() {
  let th = CoverageThresholds {
    min_unique_ids:  3,
    start_tolerance: TimeDelta::seconds(10),
    end_tolerance:   TimeDelta::seconds(10)
  };

  let mut values = slot_notes(0, 5);
  let last = at(9, 55);
  values.push(note(&id_for(last, 99), last));

  let full = judge(&slot(0), &values, &th);
  assert!(full.has_data);
  assert!(full.covers_start);
  assert!(full.covers_end);
  assert!(full.is_complete);
  assert_eq!(full.unique_ids, 6);

  let head = judge(&slot(0), &slot_notes(0, 5), &th);
  assert!(head.covers_start);
  assert!(!head.covers_end);
  assert!(!head.is_complete);

  // Exactly the threshold is not enough.
  let thin = judge(&slot(0), &values[..3], &th);
  assert!(!thin.has_data);

  let empty = judge(&slot(0), &[], &th);
  assert!(!empty.has_data && !empty.covers_start && !empty.covers_end);
}

fn judge(
  s: &Slot,
  values: &[Value],
  th: &CoverageThresholds
) -> CoverageResult {
  CoverageResult::evaluate(s, &stats_of(values), th)
}

#[test]
fn stats_count_duplicates_once() {
  let values = slot_notes(0, 4);
  let mut doubled = values.clone();
  doubled.extend(values);

  let s = stats_of(&doubled);
  assert_eq!(s.lines, 8);
  assert_eq!(s.unique_ids(), 4);
  assert_eq!(s.duplicate_ids, 4);
  assert_eq!(s.min_created, Some(at(0, 0)));
}

#[test]
fn verdicts_follow_data_overlap_and_margin() {
  let early = TimeDelta::seconds(30);
  let s = slot(0);

  assert!(matches!(
    judge_slot(&s, &SlotStats::default(), &SlotStats::default(), early),
    SlotVerdict::Failure(_)
  ));

  let filled = stats_of(&slot_notes(0, 4));
  assert_eq!(
    judge_slot(&s, &SlotStats::default(), &filled, early),
    SlotVerdict::Ok
  );

  let SlotVerdict::Warning(w) = judge_slot(&s, &filled, &filled, early)
  else {
    panic!("expected overlap warning");
  };
  assert_eq!(w.len(), 1);
  assert!(w[0].contains("4 ids"));

  let late = at(1, 0);
  let late_only = stats_of(&[note(&id_for(late, 0), late)]);
  assert!(matches!(
    judge_slot(&s, &SlotStats::default(), &late_only, early),
    SlotVerdict::Warning(_)
  ));
}

#[test]
fn exit_codes_rank_failures_over_warnings() {
  let mut summary = VerificationSummary::default();
  summary.record("a".into(), SlotVerdict::Ok);
  assert_eq!(summary.exit_code(), 0);

  summary.record("b".into(), SlotVerdict::Warning(vec!["w".into()]));
  assert_eq!(summary.exit_code(), 2);

  summary.record("c".into(), SlotVerdict::Failure("f".into()));
  assert_eq!(summary.exit_code(), 1);
  assert_eq!(summary.checked, 3);
  assert_eq!(summary.ok, 1);
}

#[tokio::test]
async fn verification_reads_sources_and_destination_apart() {
  let store = Arc::new(MemStore::new());

  put(&store, &primary(), &slot(0), &slot_notes(0, 6));
  put(&store, &dest(), &slot(10), &slot_notes(10, 6));
  put(&store, &primary(), &slot(30), &slot_notes(30, 6));
  put(&store, &dest(), &slot(30), &slot_notes(30, 6));

  let slots = [slot(0), slot(10), slot(20), slot(30)];

  let summary = verify_slots(
    Arc::clone(&store),
    vec![primary(), dest()],
    dest(),
    BOUNDS,
    &slots,
    TimeDelta::seconds(30)
  )
  .await;

  assert_eq!(summary.checked, 4);
  assert_eq!(summary.ok, 2);
  assert_eq!(
    summary.failures.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
    vec!["2024-01-01_00-20"]
  );
  assert_eq!(summary.warnings.len(), 1);
  assert_eq!(summary.warnings[0].0, "2024-01-01_00-30");
  assert_eq!(summary.exit_code(), 1);

  let summary = verify_slots(
    store,
    vec![primary()],
    dest(),
    BOUNDS,
    &[slot(0), slot(10), slot(30)],
    TimeDelta::seconds(30)
  )
  .await;
  assert_eq!(summary.exit_code(), 2);
}

#[tokio::test]
async fn report_aggregates_every_source() {
  let store = Arc::new(MemStore::new());

  let head = slot_notes(0, 3);
  let last = at(9, 58);
  let tail = vec![note(&id_for(last, 0), last), head[2].clone()];

  put(&store, &primary(), &slot(0), &head);
  put(&store, &dest(), &slot(0), &tail);

  let mut inventory =
    Inventory::new(Arc::clone(&store), vec![primary(), dest()], BOUNDS);

  let report = coverage_report(
    &mut inventory,
    &[slot(0), slot(10)],
    &CoverageThresholds {
      min_unique_ids:  3,
      start_tolerance: TimeDelta::seconds(10),
      end_tolerance:   TimeDelta::seconds(10)
    }
  )
  .await;

  assert_eq!(report.len(), 2);
  assert_eq!(report[0].unique_ids, 4);
  assert!(report[0].is_complete);
  assert!(!report[1].has_data);
}
