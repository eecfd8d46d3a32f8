//! The incremental load.
//!
//! [`DepsLoader::load`] runs the stages in order:
//!
//! 1. resolve each target's report reference to an [`Artifact`]
//! 2. diff the required artifacts against the prior state's fingerprints
//! 3. prefetch the updated artifacts as one batch
//! 4. decode the updated reports concurrently on the [`WorkerPool`]
//! 5. merge the results into a new [`DepsState`] and build the [`DependencyMap`]
//!
//! A failed prefetch aborts the load with [`LoadError::FetchFailed`]. A
//! cancelled token aborts it with [`LoadOutcome::Cancelled`]. Neither produces
//! a state, so whatever the caller held before stays current.

mod cancel;
mod parse;
mod pool;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifact::{Artifact, ArtifactError, ArtifactKey, ArtifactResolver};
use crate::diff::diff_artifacts;
use crate::fetch::{FetchError, FetchService, FetchStats, PrefetchError, PrefetchOptions, prefetch_artifacts};
use crate::lookup::DependencyMap;
use crate::progress::{LoadSummary, ProgressSink, TracingProgress};
use crate::state::{DepsState, merge};
use crate::target::{TargetInfo, TargetKey};

pub use cancel::{CancelToken, Cancelled};
pub use parse::{ParseBatch, ParseResult, parse_all};
pub use pool::WorkerPool;

/// Tunables for a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
  pub prefetch: PrefetchOptions,
}

/// Errors that abort a load.
#[derive(Debug, Error)]
pub enum LoadError {
  #[error("failed to resolve dependency report of {target}: {source}")]
  Resolve {
    target: TargetKey,
    #[source]
    source: ArtifactError,
  },

  #[error("prefetch failed, keeping previous state: {0}")]
  FetchFailed(#[source] FetchError),
}

/// What a successful load produced.
#[derive(Debug, Clone)]
pub struct LoadResult {
  /// State to persist for the next load.
  pub state: DepsState,
  /// View over `state`.
  pub dependencies: DependencyMap,
  pub summary: LoadSummary,
  pub fetch: FetchStats,
  /// Artifacts that were new or changed.
  pub updated: usize,
  /// Prior artifacts that are no longer required.
  pub removed: usize,
  /// Artifacts reused from the prior state without reading.
  pub unchanged: usize,
}

#[derive(Debug, Clone)]
pub enum LoadOutcome {
  Loaded(LoadResult),
  Cancelled,
}

impl LoadOutcome {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, LoadOutcome::Cancelled)
  }

  pub fn into_result(self) -> Option<LoadResult> {
    match self {
      LoadOutcome::Loaded(result) => Some(result),
      LoadOutcome::Cancelled => None,
    }
  }
}

/// Loads dependency reports incrementally.
pub struct DepsLoader<R, F> {
  resolver: R,
  fetcher: F,
  pool: WorkerPool,
  progress: Arc<dyn ProgressSink>,
  options: LoadOptions,
}

impl<R, F> DepsLoader<R, F>
where
  R: ArtifactResolver,
  F: FetchService,
{
  pub fn new(resolver: R, fetcher: F, pool: WorkerPool) -> Self {
    Self {
      resolver,
      fetcher,
      pool,
      progress: Arc::new(TracingProgress),
      options: LoadOptions::default(),
    }
  }

  pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
    self.progress = progress;
    self
  }

  pub fn with_options(mut self, options: LoadOptions) -> Self {
    self.options = options;
    self
  }

  pub fn resolver(&self) -> &R {
    &self.resolver
  }

  /// Load `targets`, reusing what `prior` already holds.
  pub async fn load(
    &self,
    targets: &[TargetInfo],
    prior: Option<&DepsState>,
    cancel: &CancelToken,
  ) -> Result<LoadOutcome, LoadError> {
    if cancel.is_cancelled() {
      return Ok(LoadOutcome::Cancelled);
    }

    let (required, by_artifact) = self.resolve_targets(targets)?;

    let prior_fingerprints = prior.map(DepsState::fingerprints);
    let diff = diff_artifacts(prior_fingerprints.as_deref(), &required);
    info!(
      required = diff.total_required(),
      updated = diff.updated.len(),
      removed = diff.removed.len(),
      unchanged = diff.unchanged.len(),
      "computed artifact diff"
    );

    let fetch = match prefetch_artifacts(&self.fetcher, &diff.updated, self.options.prefetch, cancel).await {
      Ok(report) => {
        if !diff.updated.is_empty() {
          self.progress.fetch_finished(&report);
        }
        report.stats
      }
      Err(PrefetchError::Cancelled) => {
        info!("load cancelled during prefetch");
        return Ok(LoadOutcome::Cancelled);
      }
      Err(PrefetchError::Fetch(e)) => {
        warn!(error = %e, "prefetch failed, load aborted");
        return Err(LoadError::FetchFailed(e));
      }
    };

    let batch = match parse_all(&diff.updated, &by_artifact, &self.pool, cancel).await {
      Ok(batch) => batch,
      Err(Cancelled) => {
        info!("load cancelled during parse");
        return Ok(LoadOutcome::Cancelled);
      }
    };

    let summary = LoadSummary {
      reports: batch.parsed(),
      bytes_read: batch.bytes_read,
    };

    let state = merge(prior, &diff.updated, &diff.removed, batch.results.into_iter().flatten());
    let dependencies = DependencyMap::from_state(&state);
    self.progress.summary(&summary);

    Ok(LoadOutcome::Loaded(LoadResult {
      state,
      dependencies,
      summary,
      fetch,
      updated: diff.updated.len(),
      removed: diff.removed.len(),
      unchanged: diff.unchanged.len(),
    }))
  }

  /// Resolve the report of every target that has one.
  ///
  /// When two targets name the same artifact, the later target owns it.
  fn resolve_targets(
    &self,
    targets: &[TargetInfo],
  ) -> Result<(Vec<Artifact>, HashMap<ArtifactKey, TargetKey>), LoadError> {
    let mut required = Vec::with_capacity(targets.len());
    let mut by_artifact: HashMap<ArtifactKey, TargetKey> = HashMap::with_capacity(targets.len());

    for info in targets {
      let Some(reference) = &info.deps_report else {
        continue;
      };
      let target = info.key();
      let artifact = self
        .resolver
        .resolve(reference)
        .map_err(|source| LoadError::Resolve {
          target: target.clone(),
          source,
        })?;

      if let Some(previous) = by_artifact.insert(artifact.key().clone(), target.clone())
        && previous != target
      {
        warn!(artifact = %artifact.key(), previous = %previous, target = %target, "artifact shared by two targets");
      }
      required.push(artifact);
    }

    debug!(targets = targets.len(), artifacts = by_artifact.len(), "resolved dependency reports");
    Ok((required, by_artifact))
  }
}
