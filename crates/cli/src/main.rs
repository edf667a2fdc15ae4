use std::path::{
  Path,
  PathBuf
};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::DateTime;
use chrono_tz::Tz;
use clap::{
  Parser,
  Subcommand
};
use gapfill_core::app::inventory::Inventory;
use gapfill_core::app::pipeline::Pipeline;
use gapfill_core::app::progress::ProgressTracker;
use gapfill_core::app::verifier::{
  coverage_report,
  verify_slots
};
use gapfill_core::domain::coverage::CoverageThresholds;
use gapfill_core::domain::model::AppConfig;
use gapfill_core::domain::period::{
  format_period_file,
  parse_period_file
};
use gapfill_core::domain::slot::Slot;
use gapfill_core::infra::config::ConfigLoader;
use gapfill_core::infra::local_store::LocalStore;
use gapfill_core::infra::logging::{
  BootError,
  LogGuard,
  init_logging
};
use gapfill_core::infra::time::{
  format_local,
  parse_local
};

#[derive(Parser)]
#[command(
  author,
  version,
  about = "gapfill ops CLI"
)]
struct Args {
  /// Path to config.toml (defaults to
  /// res/config.toml).
  #[arg(long, global = true, env = "CONFIG_PATH")]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command
}

#[derive(Subcommand)]
enum Command {
  /// Load and validate the config.
  Validate,
  /// List slots with no valid object.
  Detect {
    #[command(flatten)]
    range:          Range,
    /// Ignore the destination when
    /// looking for gaps.
    #[arg(long)]
    overwrite:      bool,
    /// Write missing slot keys here, one
    /// per line.
    #[arg(long)]
    output_missing: Option<PathBuf>,
    /// Write a period file with boundary
    /// ids here.
    #[arg(long)]
    output_periods: Option<PathBuf>
  },
  /// Per-slot coverage across every
  /// source and the destination.
  Coverage {
    #[command(flatten)]
    range:           Range,
    /// Only print incomplete slots.
    #[arg(long)]
    incomplete_only: bool
  },
  /// Check a period file after a
  /// backfill. Exits 0 when covered, 1
  /// when a slot has no data, 2 on
  /// warnings.
  Verify {
    #[arg(long)]
    periods_file: PathBuf
  },
  /// Inspect or reset batch progress.
  Progress {
    #[command(subcommand)]
    action: ProgressAction
  }
}

#[derive(clap::Args)]
struct Range {
  /// First slot, local time
  /// (YYYY-MM-DDTHH:MM).
  #[arg(long)]
  start: String,
  /// Last slot, inclusive.
  #[arg(long)]
  end:   String
}

#[derive(Subcommand)]
enum ProgressAction {
  Show,
  Clear
}

#[tokio::main]
async fn main() -> ExitCode {
  match run(Args::parse()).await {
    | Ok(code) => ExitCode::from(code),
    | Err(e) => {
      eprintln!("{e}");
      ExitCode::FAILURE
    }
  }
}

async fn run(args: Args) -> Result<u8, BootError> {
  let cfg_path = pick_config_path(args.config);

  let cfg = ConfigLoader::load(&cfg_path)
    .await
    .map_err(|e| BootError::Fatal(e.to_string()))?;

  match args.command {
    | Command::Validate => {
      println!("ok: config validated at {}", cfg_path.display());
      if let Err(e) = ConfigLoader::require_token(&cfg) {
        println!("note: {e}");
      }
      Ok(0)
    }
    | Command::Detect {
      range,
      overwrite,
      output_missing,
      output_periods
    } => {
      let _guard = logging(&cfg)?;
      detect(
        &cfg,
        &range,
        overwrite,
        output_missing.as_deref(),
        output_periods.as_deref()
      )
      .await
    }
    | Command::Coverage {
      range,
      incomplete_only
    } => {
      let _guard = logging(&cfg)?;
      coverage(&cfg, &range, incomplete_only).await
    }
    | Command::Verify {
      periods_file
    } => {
      let _guard = logging(&cfg)?;
      verify(&cfg, &periods_file).await
    }
    | Command::Progress {
      action
    } => progress(&cfg, action).await
  }
}

fn logging(cfg: &AppConfig) -> Result<LogGuard, BootError> {
  init_logging(cfg)
}

fn store(cfg: &AppConfig) -> Arc<LocalStore> {
  Arc::new(LocalStore::new(cfg.storage.base_dir.clone()))
}

fn slots_of(cfg: &AppConfig, range: &Range) -> Result<Vec<Slot>, BootError> {
  let (start, end) = parse_range(cfg, &range.start, &range.end)?;
  Pipeline::calendar(cfg, start, end)
    .map_err(|e| BootError::Fatal(e.to_string()))
}

async fn detect(
  cfg: &AppConfig,
  range: &Range,
  overwrite: bool,
  output_missing: Option<&Path>,
  output_periods: Option<&Path>
) -> Result<u8, BootError> {
  let slots = slots_of(cfg, range)?;

  let store = store(cfg);

  let missing =
    Pipeline::detect(Arc::clone(&store), cfg, &slots, overwrite).await;

  println!("slots checked: {}", slots.len());
  println!("missing:       {}", missing.len());
  for s in &missing {
    println!("  {}", s.key());
  }

  if let Some(path) = output_missing {
    let mut body: String = missing
      .iter()
      .map(|s| s.key())
      .collect::<Vec<_>>()
      .join("\n");
    if !body.is_empty() {
      body.push('\n');
    }
    write_file(path, &body).await?;
    println!("wrote {}", path.display());
  }

  if let Some(path) = output_periods {
    let periods = Pipeline::plan(store, cfg, &missing).await;
    write_file(path, &format_period_file(&periods)).await?;
    println!("wrote {} periods to {}", periods.len(), path.display());
  }

  Ok(0)
}

async fn coverage(
  cfg: &AppConfig,
  range: &Range,
  incomplete_only: bool
) -> Result<u8, BootError> {
  let slots = slots_of(cfg, range)?;

  let mut inventory = Inventory::new(
    store(cfg),
    cfg.storage.with_destination(),
    cfg.coverage.validity()
  );

  let report = coverage_report(
    &mut inventory,
    &slots,
    &CoverageThresholds {
      min_unique_ids:  cfg.coverage.min_unique_ids,
      start_tolerance: cfg.coverage.start_tolerance,
      end_tolerance:   cfg.coverage.end_tolerance
    }
  )
  .await;

  let flag = |b: bool| if b { "yes" } else { "no" };

  println!("slot              ids    data  start  end  complete");

  for r in &report {
    if incomplete_only && r.is_complete {
      continue;
    }
    println!(
      "{}  {:>5}  {:<4}  {:<5}  {:<3}  {}",
      r.slot_key,
      r.unique_ids,
      flag(r.has_data),
      flag(r.covers_start),
      flag(r.covers_end),
      flag(r.is_complete)
    );
  }

  let complete = report.iter().filter(|r| r.is_complete).count();
  let no_data = report.iter().filter(|r| !r.has_data).count();

  println!(
    "complete: {complete}/{}  without data: {no_data}",
    report.len()
  );

  Ok(0)
}

async fn verify(
  cfg: &AppConfig,
  periods_file: &Path
) -> Result<u8, BootError> {
  let content =
    tokio::fs::read_to_string(periods_file).await.map_err(|e| {
      BootError::Fatal(format!(
        "cannot read {}: {e}",
        periods_file.display()
      ))
    })?;

  let periods = parse_period_file(&content, cfg.slot_width, cfg.timezone)
    .map_err(|e| BootError::Fatal(e.to_string()))?;

  let slots: Vec<Slot> = periods.iter().flat_map(|p| p.slots()).collect();

  let summary = verify_slots(
    store(cfg),
    cfg.storage.with_destination(),
    cfg.storage.destination.clone(),
    cfg.coverage.validity(),
    &slots,
    cfg.coverage.verify_early_coverage
  )
  .await;

  for (slot, reason) in &summary.failures {
    println!("FAIL {slot}: {reason}");
  }
  for (slot, warnings) in &summary.warnings {
    for w in warnings {
      println!("WARN {slot}: {w}");
    }
  }

  println!(
    "checked: {}  ok: {}  warnings: {}  failures: {}",
    summary.checked,
    summary.ok,
    summary.warnings.len(),
    summary.failures.len()
  );

  Ok(u8::try_from(summary.exit_code()).unwrap_or(1))
}

async fn progress(
  cfg: &AppConfig,
  action: ProgressAction
) -> Result<u8, BootError> {
  let tracker = ProgressTracker::new(cfg.batch.progress_file.clone());

  match action {
    | ProgressAction::Show => {
      let file = tracker.load().await;
      let s = file.summary();

      println!("progress file: {}", tracker.path().display());
      if let Some(t) = file.last_updated {
        println!("last updated:  {}", format_local(t, &cfg.timezone));
      }
      println!(
        "total: {}  completed: {}  failed: {}  in progress: {}  pending: {}",
        s.total(),
        s.completed,
        s.failed,
        s.in_progress,
        s.pending
      );

      for (key, p) in &file.periods {
        match &p.error_message {
          | Some(msg) => println!("  {key}  {:?}  {msg}", p.status),
          | None => println!("  {key}  {:?}", p.status)
        }
      }
    }
    | ProgressAction::Clear => {
      tracker
        .clear()
        .await
        .map_err(|e| BootError::Fatal(e.to_string()))?;
      println!("cleared {}", tracker.path().display());
    }
  }

  Ok(0)
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

async fn write_file(path: &Path, body: &str) -> Result<(), BootError> {
  tokio::fs::write(path, body).await.map_err(|e| {
    BootError::Fatal(format!("cannot write {}: {e}", path.display()))
  })
}

fn pick_config_path(arg: Option<PathBuf>) -> PathBuf {
  if let Some(p) = arg
    && !p.as_os_str().is_empty()
  {
    return p;
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
