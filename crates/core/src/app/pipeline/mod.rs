//! Detection, backfill and batch
//! orchestration on top of the
//! inventory, fetcher and accumulator.

mod actions;
mod orchestrator;

pub use actions::{
  PeriodOutcome,
  backfill_period
};
pub use orchestrator::{
  BatchOptions,
  BatchSummary,
  Pipeline,
  RunOptions,
  RunSummary
};
use thiserror::Error;
use tokio::sync::watch;

use super::progress::ProgressError;
use crate::domain::slot::SlotError;
use crate::ports::search::FetchError;
use crate::ports::store::StoreError;

#[derive(Debug, Error)]
pub enum BackfillError {
  #[error("fetch: {0}")]
  Fetch(#[from] FetchError),
  #[error("store: {0}")]
  Store(#[from] StoreError),
  #[error("slot: {0}")]
  Slot(#[from] SlotError),
  #[error("progress: {0}")]
  Progress(#[from] ProgressError),
  #[error(
    "start_from {start_from} is out of range \
     (1..={total})"
  )]
  StartOutOfRange { start_from: usize, total: usize },
  #[error("interrupted")]
  Interrupted
}

/// Fires once when the run should stop.
pub struct ShutdownTrigger {
  tx: watch::Sender<bool>
}

impl ShutdownTrigger {
  pub fn trigger(&self) {
    let _ = self.tx.send(true);
  }
}

#[derive(Clone)]
pub struct ShutdownSignal {
  rx: watch::Receiver<bool>
}

impl ShutdownSignal {
  pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (
      ShutdownTrigger {
        tx
      },
      ShutdownSignal {
        rx
      }
    )
  }

  /// A signal that never fires.
  pub fn never() -> Self {
    let (_, signal) = Self::channel();
    signal
  }

  /// Triggered on the first Ctrl-C.
  pub fn ctrl_c() -> Self {
    let (trigger, signal) = Self::channel();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupt received, flushing");
        trigger.trigger();
      }
    });
    signal
  }

  pub fn is_triggered(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once triggered; pends
  /// forever if the trigger is gone
  /// without firing.
  pub async fn triggered(mut self) {
    if self.rx.wait_for(|v| *v).await.is_err() {
      std::future::pending::<()>().await;
    }
  }
}
