//! Implementation of the `deptrack load` command.
//!
//! Reads a targets manifest, loads the dependency reports that changed since the
//! last run and persists the merged state.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, info};

use deptrack_lib::artifact::{FingerprintMode, WorkspaceResolver};
use deptrack_lib::fetch::{DirectoryFetchService, FetchService, LocalFetchService};
use deptrack_lib::paths;
use deptrack_lib::state::{DepsState, LockMode, StateLock, StateStore};
use deptrack_lib::target::{TargetInfo, TargetManifest};
use deptrack_lib::{CancelToken, DepsLoader, LoadOutcome, LoadResult, WorkerPool};

use crate::output::{format_bytes, format_duration, print_json, print_stat, print_success, print_warning};

pub struct LoadArgs {
  pub targets: PathBuf,
  pub exec_root: PathBuf,
  pub remote_dir: Option<PathBuf>,
  pub jobs: Option<usize>,
  pub content_fingerprints: bool,
  pub timeout: Option<Duration>,
  pub json: bool,
}

#[derive(Serialize)]
struct LoadReport {
  targets: usize,
  updated: usize,
  removed: usize,
  unchanged: usize,
  reports: usize,
  bytes_read: u64,
  fetched: usize,
  fetched_bytes: u64,
  entries: usize,
  elapsed_ms: u64,
}

pub fn cmd_load(args: LoadArgs) -> Result<()> {
  let manifest = TargetManifest::load(&args.targets)
    .with_context(|| format!("Failed to read targets from {}", args.targets.display()))?;

  let store = StateStore::default_store();
  let _lock = StateLock::acquire(store.base_path(), LockMode::Exclusive, "deptrack load")?;
  let prior = store.load().context("Failed to load stored state")?;
  debug!(entries = prior.as_ref().map_or(0, DepsState::len), "prior state");

  let mode = if args.content_fingerprints {
    FingerprintMode::Content
  } else {
    FingerprintMode::Metadata
  };
  let exec_root = dunce::canonicalize(&args.exec_root)
    .with_context(|| format!("Execution root not found: {}", args.exec_root.display()))?;
  let resolver = WorkspaceResolver::new(exec_root, paths::cache_dir()).with_mode(mode);
  let pool = args.jobs.map(WorkerPool::new).unwrap_or_default();

  let start = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(async {
    let cancel = CancelToken::new();
    watch_for_cancel(&cancel, args.timeout);

    match &args.remote_dir {
      Some(dir) => {
        let fetcher = DirectoryFetchService::new(dir.clone()).with_parallelism(pool.size());
        run(DepsLoader::new(resolver, fetcher, pool), &manifest.targets, prior.as_ref(), &cancel).await
      }
      None => {
        let loader = DepsLoader::new(resolver, LocalFetchService::new(), pool);
        run(loader, &manifest.targets, prior.as_ref(), &cancel).await
      }
    }
  })?;
  let elapsed = start.elapsed();

  let result = match outcome {
    LoadOutcome::Loaded(result) => result,
    LoadOutcome::Cancelled => {
      print_warning("Load cancelled, stored state left unchanged");
      bail!("load cancelled");
    }
  };

  store.save(&result.state).context("Failed to save state")?;
  info!(path = %store.state_path().display(), entries = result.state.len(), "state saved");

  let report = LoadReport {
    targets: manifest.targets.len(),
    updated: result.updated,
    removed: result.removed,
    unchanged: result.unchanged,
    reports: result.summary.reports,
    bytes_read: result.summary.bytes_read,
    fetched: result.fetch.fetched,
    fetched_bytes: result.fetch.bytes,
    entries: result.state.len(),
    elapsed_ms: elapsed.as_millis() as u64,
  };

  if args.json {
    print_json(&report)?;
  } else {
    print_summary(&report, elapsed);
  }

  Ok(())
}

async fn run<F: FetchService>(
  loader: DepsLoader<WorkspaceResolver, F>,
  targets: &[TargetInfo],
  prior: Option<&DepsState>,
  cancel: &CancelToken,
) -> Result<LoadOutcome> {
  let outcome = loader.load(targets, prior, cancel).await.context("Load failed")?;
  if let LoadOutcome::Loaded(LoadResult { dependencies, .. }) = &outcome {
    debug!(targets = dependencies.len(), "dependency map ready");
  }
  Ok(outcome)
}

/// Cancel on Ctrl-C, or once `timeout` elapses.
fn watch_for_cancel(cancel: &CancelToken, timeout: Option<Duration>) {
  let on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      info!("interrupt received, cancelling load");
      on_signal.cancel();
    }
  });

  if let Some(timeout) = timeout {
    let on_timeout = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(timeout).await;
      info!(timeout = %humantime::format_duration(timeout), "timeout reached, cancelling load");
      on_timeout.cancel();
    });
  }
}

fn print_summary(report: &LoadReport, elapsed: Duration) {
  print_success(&format!(
    "Loaded {} dependency reports ({}) in {}",
    report.reports,
    format_bytes(report.bytes_read),
    format_duration(elapsed)
  ));
  print_stat("Targets", &report.targets.to_string());
  print_stat("Updated", &report.updated.to_string());
  print_stat("Unchanged", &report.unchanged.to_string());
  print_stat("Removed", &report.removed.to_string());
  if report.fetched > 0 {
    print_stat(
      "Fetched",
      &format!("{} ({})", report.fetched, format_bytes(report.fetched_bytes)),
    );
  }
  print_stat("Entries", &report.entries.to_string());
}
