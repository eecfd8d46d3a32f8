//! Concurrent decoding of updated reports.

use std::collections::HashMap;
use std::io::BufReader;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, error, info, warn};

use super::cancel::{CancelToken, Cancelled};
use super::pool::WorkerPool;
use crate::artifact::{Artifact, ArtifactKey, ArtifactState};
use crate::report::read_report;
use crate::target::TargetKey;

/// A freshly decoded report, ready to become an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseResult {
  /// Fingerprint of the artifact as it was read.
  pub artifact: ArtifactState,
  pub target: TargetKey,
  /// Explicit and implicit dependency paths, in report order.
  pub dependencies: Vec<String>,
}

/// Everything the parse stage produced.
#[derive(Debug, Default)]
pub struct ParseBatch {
  /// One slot per spawned task; `None` where the report was skipped.
  pub results: Vec<Option<ParseResult>>,
  pub bytes_read: u64,
}

impl ParseBatch {
  pub fn parsed(&self) -> usize {
    self.results.iter().filter(|r| r.is_some()).count()
  }
}

/// Decode every artifact that maps to a target, one task per artifact.
///
/// Failures of a single artifact are logged and leave a `None` slot. Artifacts
/// with no target are dropped before any task is spawned. On cancellation the
/// outstanding tasks are aborted and nothing is returned.
pub async fn parse_all(
  artifacts: &[Artifact],
  targets: &HashMap<ArtifactKey, TargetKey>,
  pool: &WorkerPool,
  cancel: &CancelToken,
) -> Result<ParseBatch, Cancelled> {
  let bytes_read = Arc::new(AtomicU64::new(0));
  let mut join_set: JoinSet<Option<ParseResult>> = JoinSet::new();

  for artifact in artifacts {
    let Some(target) = targets.get(artifact.key()) else {
      debug!(artifact = %artifact.key(), "no target for artifact, skipping");
      continue;
    };

    let artifact = artifact.clone();
    let target = target.clone();
    let pool = pool.clone();
    let cancel = cancel.clone();
    let bytes_read = bytes_read.clone();

    join_set.spawn(async move {
      let _permit = match pool.acquire().await {
        Ok(permit) => permit,
        Err(e) => {
          error!(error = %e, "worker pool closed");
          return None;
        }
      };
      if cancel.is_cancelled() {
        return None;
      }

      let key = artifact.key().clone();
      let span = Span::current();
      let task = move || span.in_scope(|| parse_one(&artifact, target, &bytes_read));
      match tokio::task::spawn_blocking(task).await {
        Ok(result) => result,
        Err(e) => {
          error!(artifact = %key, error = %e, "parse task panicked");
          None
        }
      }
    }
    .in_current_span());
  }

  let mut batch = ParseBatch::default();
  loop {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        join_set.abort_all();
        debug!(outstanding = join_set.len(), "parse cancelled");
        return Err(Cancelled);
      }
      next = join_set.join_next() => match next {
        None => break,
        Some(Ok(result)) => batch.results.push(result),
        Some(Err(e)) => {
          error!(error = %e, "parse task failed");
          batch.results.push(None);
        }
      },
    }
  }

  batch.bytes_read = bytes_read.load(Ordering::Relaxed);
  Ok(batch)
}

fn parse_one(artifact: &Artifact, target: TargetKey, bytes_read: &AtomicU64) -> Option<ParseResult> {
  let file = match artifact.open() {
    Ok(file) => file,
    Err(e) if e.is_not_found() => {
      info!(artifact = %artifact.key(), target = %target, "dependency report not found, skipping");
      return None;
    }
    Err(e) => {
      warn!(artifact = %artifact.key(), target = %target, error = %e, "cannot open dependency report");
      return None;
    }
  };

  let (report, read) = match read_report(BufReader::new(file)) {
    Ok(decoded) => decoded,
    Err(e) => {
      warn!(artifact = %artifact.key(), target = %target, error = %e, "cannot decode dependency report");
      return None;
    }
  };
  bytes_read.fetch_add(read, Ordering::Relaxed);

  let dependencies = report.relevant_paths();
  debug!(artifact = %artifact.key(), target = %target, count = dependencies.len(), bytes = read, "parsed");

  Some(ParseResult {
    artifact: artifact.state(),
    target,
    dependencies,
  })
}
