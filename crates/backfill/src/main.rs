use std::path::{
  Path,
  PathBuf
};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use clap::Parser;
use gapfill_core::app::context::AppContext;
use gapfill_core::app::pipeline::{
  BatchOptions,
  Pipeline,
  RunOptions,
  ShutdownSignal
};
use gapfill_core::app::progress::ProgressTracker;
use gapfill_core::domain::model::AppConfig;
use gapfill_core::domain::period::parse_period_file;
use gapfill_core::infra::config::ConfigLoader;
use gapfill_core::infra::local_store::LocalStore;
use gapfill_core::infra::logging::{
  BootError,
  init_logging
};
use gapfill_core::infra::reqwest_search::ReqwestSearch;
use gapfill_core::infra::system_clock::SystemClock;
use gapfill_core::infra::time::parse_local;
use tracing::{
  error,
  info,
  warn
};

/// Exit status after Ctrl-C, as a shell
/// reports SIGINT.
const EXIT_INTERRUPTED: u8 = 130;

type Ctx = AppContext<ReqwestSearch, LocalStore, SystemClock>;

#[derive(Parser)]
#[command(
  author,
  version,
  about = "Backfills missing time slots from the search API"
)]
struct Args {
  /// Path to config.toml (defaults to
  /// CONFIG_PATH or res/config.toml).
  config_path: Option<PathBuf>,

  /// First slot of the range, local
  /// time (YYYY-MM-DDTHH:MM).
  #[arg(long, requires = "end", conflicts_with = "periods_file")]
  start: Option<String>,

  /// Last slot of the range, inclusive.
  #[arg(long, requires = "start")]
  end: Option<String>,

  /// Treat slots in the destination as
  /// missing and fetch them again.
  #[arg(long)]
  overwrite: bool,

  /// Period file with one
  /// `start,end[,since,until]` per line.
  #[arg(long)]
  periods_file: Option<PathBuf>,

  /// Skip periods already completed.
  #[arg(long)]
  resume: bool,

  /// Delete the progress file first.
  #[arg(long)]
  clear_progress: bool,

  /// 1-based index of the first period.
  #[arg(long, default_value_t = 1)]
  start_from: usize,

  /// Process at most this many periods.
  #[arg(long)]
  limit: Option<usize>,

  /// Plan only; nothing is fetched or
  /// written.
  #[arg(long)]
  dry_run: bool,

  /// Also write posts without Japanese
  /// text (overrides the config).
  #[arg(long)]
  keep_non_japanese: bool
}

enum Outcome {
  Done,
  /// Some period failed or gaps remain.
  Incomplete,
  Interrupted
}

/// Binary entrypoint:
/// - loads config and initializes
///   logging
/// - builds the search client, local
///   store and clock
/// - runs either a range backfill or a
///   resumable batch over a period file
/// - exits 1 when a period failed or
///   gaps remain, 130 when interrupted
#[tokio::main]
async fn main() -> ExitCode {
  match run(Args::parse()).await {
    | Ok(Outcome::Done) => ExitCode::SUCCESS,
    | Ok(Outcome::Incomplete) => ExitCode::FAILURE,
    | Ok(Outcome::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
    | Err(e) => {
      eprintln!("{e}");
      ExitCode::FAILURE
    }
  }
}

async fn run(args: Args) -> Result<Outcome, BootError> {
  let cfg_path = pick_config_path(args.config_path.clone());

  let mut cfg = ConfigLoader::load(&cfg_path)
    .await
    .map_err(|e| BootError::Fatal(e.to_string()))?;

  if args.keep_non_japanese {
    cfg.storage.keep_non_japanese = true;
  }

  let _log_guard = init_logging(&cfg)?;

  info!(
    config = %cfg_path.display(),
    timezone = %cfg.timezone,
    slot_minutes = cfg.slot_width.num_minutes(),
    mode = ?cfg.api.mode,
    sources = cfg.storage.sources.len(),
    destination = %cfg.storage.destination.container,
    keep_non_japanese = cfg.storage.keep_non_japanese,
    "loaded config"
  );

  let token = ConfigLoader::require_token(&cfg)
    .map_err(|e| BootError::Fatal(e.to_string()))?;

  let search = Arc::new(
    ReqwestSearch::new(&cfg.api, token, cfg.retry)
      .map_err(|e| BootError::Fatal(e.to_string()))?
  );

  let store = Arc::new(LocalStore::new(cfg.storage.base_dir.clone()));

  let ctx = AppContext {
    cfg: Arc::new(cfg),
    search,
    store,
    clock: Arc::new(SystemClock)
  };

  let shutdown = ShutdownSignal::ctrl_c();

  match (&args.start, &args.end, &args.periods_file) {
    | (Some(start), Some(end), None) => {
      run_range(&ctx, start, end, &args, &shutdown).await
    }
    | (None, None, Some(path)) => {
      run_batch(&ctx, path, &args, &shutdown).await
    }
    | _ => {
      Err(BootError::Fatal(
        "pass either --start/--end or --periods-file".into()
      ))
    }
  }
}

async fn run_range(
  ctx: &Ctx,
  start: &str,
  end: &str,
  args: &Args,
  shutdown: &ShutdownSignal
) -> Result<Outcome, BootError> {
  let (start, end) = parse_range(&ctx.cfg, start, end)?;

  let summary = Pipeline::run_range(
    ctx,
    start,
    end,
    RunOptions {
      overwrite: args.overwrite,
      dry_run:   args.dry_run
    },
    shutdown
  )
  .await
  .map_err(|e| {
    error!(error = %e, "range run failed");
    BootError::Fatal(e.to_string())
  })?;

  println!("slots checked:   {}", summary.total_slots);
  println!("missing:         {}", summary.missing.len());
  println!("periods:         {}", summary.periods.len());
  println!("failed periods:  {}", summary.failed_periods);
  println!("slots written:   {}", summary.slots_written);
  println!("records written: {}", summary.records_written);

  if !args.dry_run {
    println!("remaining gaps:  {}", summary.remaining.len());
    for slot in &summary.remaining {
      println!("  {}", slot.key());
    }
  }

  if summary.interrupted {
    return Ok(Outcome::Interrupted);
  }

  if !summary.succeeded() {
    warn!(
      failed = summary.failed_periods,
      remaining = summary.remaining.len(),
      "range run incomplete"
    );
    return Ok(Outcome::Incomplete);
  }

  Ok(Outcome::Done)
}

async fn run_batch(
  ctx: &Ctx,
  periods_file: &Path,
  args: &Args,
  shutdown: &ShutdownSignal
) -> Result<Outcome, BootError> {
  let content =
    tokio::fs::read_to_string(periods_file).await.map_err(|e| {
      BootError::Fatal(format!(
        "cannot read {}: {e}",
        periods_file.display()
      ))
    })?;

  let periods =
    parse_period_file(&content, ctx.cfg.slot_width, ctx.cfg.timezone)
      .map_err(|e| BootError::Fatal(e.to_string()))?;

  if periods.is_empty() {
    warn!(file = %periods_file.display(), "no periods to process");
    return Ok(Outcome::Done);
  }

  let tracker = ProgressTracker::new(ctx.cfg.batch.progress_file.clone());

  if args.clear_progress {
    tracker
      .clear()
      .await
      .map_err(|e| BootError::Fatal(e.to_string()))?;
    info!(path = %tracker.path().display(), "progress cleared");
  }

  let summary = Pipeline::run_batch(
    ctx,
    &periods,
    &tracker,
    BatchOptions {
      resume:     args.resume,
      start_from: args.start_from,
      limit:      args.limit,
      dry_run:    args.dry_run
    },
    shutdown
  )
  .await
  .map_err(|e| {
    error!(error = %e, "batch failed");
    BootError::Fatal(e.to_string())
  })?;

  println!("periods selected: {}", summary.selected);
  println!("skipped:          {}", summary.skipped);
  println!("completed:        {}", summary.completed);
  println!("failed:           {}", summary.failed);

  if summary.interrupted {
    println!("interrupted; rerun with --resume to continue");
    return Ok(Outcome::Interrupted);
  }

  if !summary.succeeded() {
    return Ok(Outcome::Incomplete);
  }

  Ok(Outcome::Done)
}

fn parse_range(
  cfg: &AppConfig,
  start: &str,
  end: &str
) -> Result<(DateTime<Tz>, DateTime<Tz>), BootError> {
  let start =
    parse_local(start, cfg.timezone).map_err(BootError::Fatal)?;
  let end = parse_local(end, cfg.timezone).map_err(BootError::Fatal)?;

  if end < start {
    return Err(BootError::Fatal(
      "--end must not precede --start".into()
    ));
  }

  Ok((start, end))
}

fn pick_config_path(arg: Option<PathBuf>) -> PathBuf {
  if let Some(p) = arg {
    return p;
  }

  if let Ok(p) = std::env::var("CONFIG_PATH")
    && !p.trim().is_empty()
  {
    return PathBuf::from(p);
  }

  let candidates = [
    PathBuf::from("crates/backfill/res/config.toml"),
    PathBuf::from("res/config.toml")
  ];

  for p in &candidates {
    if p.exists() {
      return p.clone();
    }
  }

  candidates[1].clone()
}
