use std::sync::Arc;

use tracing::{
  debug,
  error,
  info,
  warn
};

use super::{
  BackfillError,
  ShutdownSignal
};
use crate::app::accumulator::{
  ReadySlot,
  SlotAccumulator
};
use crate::app::context::AppContext;
use crate::app::fetcher::{
  CursorFetcher,
  FetchPlan,
  WalkSummary
};
use crate::app::verifier::CoverageVerifier;
use crate::app::writer::SlotWriter;
use crate::domain::period::Period;
use crate::domain::record::Record;
use crate::domain::slot::Slot;
use crate::ports::clock::Clock;
use crate::ports::search::SearchApi;
use crate::ports::store::{
  ObjectStore,
  StoreError
};

#[derive(Debug, Clone, Default)]
pub struct PeriodOutcome {
  pub period_key:      String,
  pub slots_written:   usize,
  pub records_written: usize,
  pub skipped_records: usize,
  pub walk:            WalkSummary,
  pub remaining:       Vec<Slot>
}

struct Tally {
  slots:   usize,
  records: usize
}

async fn write_ready<O>(
  writer: &SlotWriter<O>,
  ready: ReadySlot,
  tally: &mut Tally
) -> Result<(), StoreError>
where
  O: ObjectStore + ?Sized
{
  let n = writer.write(ready).await?;
  tally.slots += 1;
  tally.records += n;
  Ok(())
}

/// Fetches one period, writes every
/// slot it reconstructs and re-checks
/// the period's slots.
///
/// Whatever ends the walk (exhaustion,
/// error or shutdown), every record
/// already fetched is written before
/// returning, including those still
/// queued in the channel. A failed flush
/// is logged and never replaces the
/// error that ended the walk.
pub async fn backfill_period<S, O, C>(
  ctx: &AppContext<S, O, C>,
  period: &Period,
  shutdown: &ShutdownSignal
) -> Result<PeriodOutcome, BackfillError>
where
  S: SearchApi + ?Sized + 'static,
  O: ObjectStore + ?Sized,
  C: Clock + ?Sized
{
  let cfg = &ctx.cfg;

  let plan = FetchPlan::for_period(
    &cfg.api,
    cfg.coverage.fetch_early_coverage,
    period
  );

  info!(
    start = %period.start_slot.key(),
    end = %period.end_slot.key(),
    since_id = ?period.since_id,
    until_id = ?period.until_id,
    mode = ?plan.mode,
    "backfilling period"
  );

  let window_start = plan.window_start;
  let window_end = plan.window_end;

  let mut stream = CursorFetcher::new(Arc::clone(&ctx.search))
    .stream(plan, cfg.api.limit as usize);

  let mut acc = SlotAccumulator::new(
    cfg.slot_width,
    cfg.timezone,
    cfg.coverage.fetch_early_coverage,
    cfg.coverage.flush_lag
  );

  let writer = SlotWriter::new(
    Arc::clone(&ctx.store),
    cfg.storage.destination.clone()
  )
  .japanese_only(!cfg.storage.keep_non_japanese);

  let mut tally = Tally {
    slots:   0,
    records: 0
  };

  let mut outside = 0usize;

  // Timeline walks may run past the
  // window; only its slots are written.
  let in_window = |rec: &Record| {
    rec.created_at >= window_start && rec.created_at < window_end
  };

  // Ready slots not yet written when the
  // walk ends.
  let mut pending: Vec<ReadySlot> = Vec::new();

  let interrupted = shutdown.clone().triggered();
  tokio::pin!(interrupted);

  let run: Result<(), BackfillError> = 'run: loop {
    let item = tokio::select! {
      biased;
      _ = &mut interrupted => None,
      item = stream.next() => Some(item)
    };

    let Some(item) = item else {
      warn!("interrupted, flushing buffered slots");
      break Err(BackfillError::Interrupted);
    };

    match item {
      | None => break Ok(()),
      | Some(Err(e)) => break Err(e.into()),
      | Some(Ok(rec)) => {
        if !in_window(&rec) {
          outside += 1;
          continue;
        }

        let mut ready = acc.push(rec).into_iter();
        while let Some(slot) = ready.next() {
          if let Err(e) =
            write_ready(&writer, slot, &mut tally).await
          {
            pending.extend(ready);
            break 'run Err(e.into());
          }
        }
      }
    }
  };

  let (queued, walk) = stream.close_and_drain().await;

  if !queued.is_empty() {
    debug!(records = queued.len(), "draining queued records");
  }

  for rec in queued {
    if !in_window(&rec) {
      outside += 1;
      continue;
    }
    pending.extend(acc.push(rec));
  }
  pending.extend(acc.drain_all());

  let mut flush_error = None;

  for ready in pending {
    let slot = ready.slot.key();
    if let Err(e) =
      write_ready(&writer, ready, &mut tally).await
    {
      error!(
        slot = %slot,
        error = %e,
        "failed to flush slot"
      );
      flush_error.get_or_insert(e);
    }
  }

  match (run, flush_error) {
    | (Err(e), Some(fe)) => {
      error!(
        error = %e,
        flush_error = %fe,
        "flush after failure also failed"
      );
      return Err(e);
    }
    | (Err(e), None) => return Err(e),
    | (Ok(()), Some(fe)) => return Err(fe.into()),
    | (Ok(()), None) => {}
  }

  let mut verifier = CoverageVerifier::new(
    Arc::clone(&ctx.store),
    cfg.storage.with_destination(),
    cfg.coverage.validity()
  );

  let remaining =
    verifier.remaining_gaps(&period.slots()).await;

  info!(
    start = %period.start_slot.key(),
    end = %period.end_slot.key(),
    pages = walk.pages,
    slots_written = tally.slots,
    records = tally.records,
    outside_window = outside,
    remaining = remaining.len(),
    stop = ?walk.stop_reason,
    "period done"
  );

  Ok(PeriodOutcome {
    period_key: period.key(),
    slots_written: tally.slots,
    records_written: tally.records,
    skipped_records: outside + acc.dropped(),
    walk,
    remaining
  })
}
