use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{
  error,
  info,
  warn
};

use super::actions::backfill_period;
use super::{
  BackfillError,
  ShutdownSignal
};
use crate::app::context::AppContext;
use crate::app::inventory::Inventory;
use crate::app::periods::plan_periods;
use crate::app::progress::ProgressTracker;
use crate::app::verifier::CoverageVerifier;
use crate::domain::model::AppConfig;
use crate::domain::period::Period;
use crate::domain::progress::PeriodStatus;
use crate::domain::slot::{
  Slot,
  SlotCalendar
};
use crate::infra::time::epoch_ms_to_utc;
use crate::ports::clock::Clock;
use crate::ports::search::SearchApi;
use crate::ports::store::ObjectStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
  /// Ignore what the destination already
  /// holds when detecting gaps.
  pub overwrite: bool,
  pub dry_run:   bool
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
  pub total_slots:     usize,
  pub missing:         Vec<Slot>,
  pub periods:         Vec<Period>,
  pub failed_periods:  usize,
  pub slots_written:   usize,
  pub records_written: usize,
  pub remaining:       Vec<Slot>,
  pub interrupted:     bool
}

impl RunSummary {
  /// No period failed, nothing was
  /// interrupted and no gap remains.
  pub fn succeeded(&self) -> bool {
    self.failed_periods == 0
      && !self.interrupted
      && self.remaining.is_empty()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
  pub resume:     bool,
  /// 1-based index of the first period
  /// to consider.
  pub start_from: usize,
  pub limit:      Option<usize>,
  pub dry_run:    bool
}

impl Default for BatchOptions {
  fn default() -> Self {
    Self {
      resume:     false,
      start_from: 1,
      limit:      None,
      dry_run:    false
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
  pub selected:    usize,
  pub skipped:     usize,
  pub completed:   usize,
  pub failed:      usize,
  pub interrupted: bool
}

impl BatchSummary {
  pub fn succeeded(&self) -> bool {
    self.failed == 0 && !self.interrupted
  }
}

pub struct Pipeline;

impl Pipeline {
  /// Slots of `[start, end]`, the first
  /// one aligned down to the slot grid.
  pub fn calendar(
    cfg: &AppConfig,
    start: DateTime<Tz>,
    end: DateTime<Tz>
  ) -> Result<Vec<Slot>, BackfillError> {
    let first = Slot::containing(
      start.with_timezone(&chrono::Utc),
      cfg.slot_width,
      cfg.timezone
    )?;

    Ok(SlotCalendar::generate(
      first.start,
      end.with_timezone(&cfg.timezone),
      cfg.slot_width
    )?)
  }

  /// Missing slots across the original
  /// sources, plus the destination unless
  /// `overwrite`.
  pub async fn detect<O>(
    store: Arc<O>,
    cfg: &AppConfig,
    slots: &[Slot],
    overwrite: bool
  ) -> Vec<Slot>
  where
    O: ObjectStore + ?Sized
  {
    let sources = if overwrite {
      cfg.storage.sources.clone()
    } else {
      cfg.storage.with_destination()
    };

    let mut inventory =
      Inventory::new(store, sources, cfg.coverage.validity());

    let missing = inventory.missing(slots).await;

    info!(
      slots = slots.len(),
      missing = missing.len(),
      days = inventory.cached_days(),
      "gap detection finished"
    );

    missing
  }

  /// Groups missing slots into periods
  /// with boundary ids read from the
  /// sources and the destination.
  pub async fn plan<O>(
    store: Arc<O>,
    cfg: &AppConfig,
    missing: &[Slot]
  ) -> Vec<Period>
  where
    O: ObjectStore + ?Sized
  {
    let mut inventory = Inventory::new(
      store,
      cfg.storage.with_destination(),
      cfg.coverage.validity()
    );

    plan_periods(&mut inventory, missing).await
  }

  pub async fn run_range<S, O, C>(
    ctx: &AppContext<S, O, C>,
    start: DateTime<Tz>,
    end: DateTime<Tz>,
    opts: RunOptions,
    shutdown: &ShutdownSignal
  ) -> Result<RunSummary, BackfillError>
  where
    S: SearchApi + ?Sized + 'static,
    O: ObjectStore + ?Sized,
    C: Clock + ?Sized
  {
    let cfg = &ctx.cfg;

    let slots = Self::calendar(cfg, start, end)?;

    let missing = Self::detect(
      Arc::clone(&ctx.store),
      cfg,
      &slots,
      opts.overwrite
    )
    .await;

    let mut summary = RunSummary {
      total_slots: slots.len(),
      missing: missing.clone(),
      ..RunSummary::default()
    };

    if missing.is_empty() {
      info!("nothing to backfill");
      return Ok(summary);
    }

    let periods =
      Self::plan(Arc::clone(&ctx.store), cfg, &missing).await;

    summary.periods = periods.clone();

    if opts.dry_run {
      for p in &periods {
        info!(
          start = %p.start_slot.key(),
          end = %p.end_slot.key(),
          "dry run, would backfill"
        );
      }
      return Ok(summary);
    }

    for (idx, period) in periods.iter().enumerate() {
      if idx > 0
        && !pause(cfg.batch.period_sleep, shutdown).await
      {
        summary.interrupted = true;
        break;
      }

      match backfill_period(ctx, period, shutdown).await {
        | Ok(outcome) => {
          summary.slots_written += outcome.slots_written;
          summary.records_written +=
            outcome.records_written;
        }
        | Err(BackfillError::Interrupted) => {
          summary.interrupted = true;
          break;
        }
        | Err(e) => {
          error!(
            period = %period.key(),
            error = %e,
            "period failed"
          );
          summary.failed_periods += 1;
        }
      }
    }

    let mut verifier = CoverageVerifier::new(
      Arc::clone(&ctx.store),
      cfg.storage.with_destination(),
      cfg.coverage.validity()
    );

    summary.remaining = verifier.remaining_gaps(&slots).await;

    info!(
      total = summary.total_slots,
      missing = summary.missing.len(),
      periods = summary.periods.len(),
      failed = summary.failed_periods,
      written = summary.slots_written,
      remaining = summary.remaining.len(),
      interrupted = summary.interrupted,
      "range run finished"
    );

    Ok(summary)
  }

  /// Works through a period list with
  /// persisted progress. `in_progress`
  /// is written before each attempt so a
  /// crash leaves a resumable marker.
  pub async fn run_batch<S, O, C>(
    ctx: &AppContext<S, O, C>,
    periods: &[Period],
    tracker: &ProgressTracker,
    opts: BatchOptions,
    shutdown: &ShutdownSignal
  ) -> Result<BatchSummary, BackfillError>
  where
    S: SearchApi + ?Sized + 'static,
    O: ObjectStore + ?Sized,
    C: Clock + ?Sized
  {
    if opts.start_from == 0 || opts.start_from > periods.len() {
      return Err(BackfillError::StartOutOfRange {
        start_from: opts.start_from,
        total:      periods.len()
      });
    }

    let selected: Vec<&Period> = periods
      .iter()
      .skip(opts.start_from.saturating_sub(1))
      .take(opts.limit.unwrap_or(usize::MAX))
      .collect();

    let mut summary = BatchSummary {
      selected: selected.len(),
      ..BatchSummary::default()
    };

    info!(
      total = periods.len(),
      selected = selected.len(),
      resume = opts.resume,
      progress = %tracker.path().display(),
      "starting batch"
    );

    let mut attempted = 0usize;

    for period in selected {
      let key = period.key();

      if opts.resume && tracker.should_skip(&key).await {
        info!(period = %key, "already completed, skipping");
        summary.skipped += 1;
        continue;
      }

      if opts.dry_run {
        let status = tracker
          .status_of(&key)
          .await
          .unwrap_or(PeriodStatus::Pending);
        info!(
          period = %key,
          status = ?status,
          "dry run, would backfill"
        );
        continue;
      }

      if attempted > 0
        && !pause(ctx.cfg.batch.period_sleep, shutdown).await
      {
        summary.interrupted = true;
        break;
      }

      attempted += 1;

      let now =
        epoch_ms_to_utc(ctx.clock.now_epoch_ms().await);

      tracker.mark_in_progress(&key, now).await?;

      let result = backfill_period(ctx, period, shutdown).await;

      let now =
        epoch_ms_to_utc(ctx.clock.now_epoch_ms().await);

      match result {
        | Ok(outcome) => {
          if !outcome.remaining.is_empty() {
            warn!(
              period = %key,
              remaining = outcome.remaining.len(),
              "period fetched but slots still \
               below validity bounds"
            );
          }
          tracker.mark_completed(&key, now).await?;
          summary.completed += 1;
        }
        | Err(BackfillError::Interrupted) => {
          tracker
            .mark_failed(&key, now, "interrupted")
            .await?;
          summary.failed += 1;
          summary.interrupted = true;
          break;
        }
        | Err(e) => {
          error!(period = %key, error = %e, "period failed");
          tracker
            .mark_failed(&key, now, &e.to_string())
            .await?;
          summary.failed += 1;
        }
      }
    }

    let progress = tracker.summary().await;

    info!(
      completed = summary.completed,
      failed = summary.failed,
      skipped = summary.skipped,
      interrupted = summary.interrupted,
      recorded_total = progress.total(),
      recorded_completed = progress.completed,
      "batch finished"
    );

    Ok(summary)
  }
}

/// Sleeps between periods; `false` when
/// interrupted first.
async fn pause(
  d: std::time::Duration,
  shutdown: &ShutdownSignal
) -> bool {
  if shutdown.is_triggered() {
    return false;
  }
  if d.is_zero() {
    return true;
  }
  tokio::select! {
    _ = tokio::time::sleep(d) => true,
    _ = shutdown.clone().triggered() => false
  }
}
