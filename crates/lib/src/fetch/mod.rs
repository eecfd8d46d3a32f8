//! Bulk prefetch of changed artifacts.
//!
//! Before any report is parsed, every updated artifact is handed to a
//! [`FetchService`] in one batch so its bytes are readable locally. The load
//! waits for the whole batch; a failed batch aborts the load.
//!
//! Two services ship with the crate:
//! - [`LocalFetchService`]: nothing to transfer; checks remote artifacts are
//!   already in the cache
//! - [`DirectoryFetchService`]: copies remote artifacts from a
//!   content-addressed directory into the cache, verifying digests

mod directory;
mod local;

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::artifact::{Artifact, ArtifactKey};
use crate::pipeline::CancelToken;

pub use directory::DirectoryFetchService;
pub use local::LocalFetchService;

/// Scheduling hint passed through to the fetch service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPriority {
  Low,
  #[default]
  Normal,
  High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefetchOptions {
  pub priority: FetchPriority,
  /// Whether the service should do the work on the caller's behalf rather
  /// than queueing it. The load awaits the result either way.
  pub blocking: bool,
}

impl Default for PrefetchOptions {
  fn default() -> Self {
    Self {
      priority: FetchPriority::Normal,
      blocking: true,
    }
  }
}

/// What a prefetch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchStats {
  /// Artifacts handed to the service.
  pub requested: usize,
  /// Artifacts whose bytes were transferred.
  pub fetched: usize,
  /// Artifacts that were already available.
  pub cached: usize,
  /// Bytes transferred.
  pub bytes: u64,
}

/// Errors a fetch service can report. Any of them fails the whole batch.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("fetch failed: {0}")]
  Failed(String),

  #[error("artifact {key} is not available at {}", .path.display())]
  Missing { key: ArtifactKey, path: PathBuf },

  #[error("digest mismatch for {key}: expected {expected}, got {actual}")]
  DigestMismatch {
    key: ArtifactKey,
    expected: String,
    actual: String,
  },

  #[error("I/O error fetching {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("fetch task failed: {0}")]
  Join(String),
}

/// Makes artifact bytes readable locally.
pub trait FetchService: Send + Sync {
  /// Fetch every artifact in the batch, resolving once all are ready.
  fn prefetch(
    &self,
    artifacts: &[Artifact],
    options: PrefetchOptions,
  ) -> impl Future<Output = Result<FetchStats, FetchError>> + Send;
}

/// Outcome of a completed prefetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
  pub stats: FetchStats,
  pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum PrefetchError {
  #[error("prefetch cancelled")]
  Cancelled,

  #[error(transparent)]
  Fetch(#[from] FetchError),
}

/// Prefetch `artifacts` through `service`, waiting until done or cancelled.
///
/// An empty batch completes immediately without calling the service.
pub async fn prefetch_artifacts<F: FetchService>(
  service: &F,
  artifacts: &[Artifact],
  options: PrefetchOptions,
  cancel: &CancelToken,
) -> Result<FetchReport, PrefetchError> {
  if artifacts.is_empty() {
    debug!("nothing to prefetch");
    return Ok(FetchReport::default());
  }
  if cancel.is_cancelled() {
    return Err(PrefetchError::Cancelled);
  }

  let start = Instant::now();
  debug!(count = artifacts.len(), priority = ?options.priority, "prefetching artifacts");

  let stats = tokio::select! {
    biased;
    _ = cancel.cancelled() => return Err(PrefetchError::Cancelled),
    result = service.prefetch(artifacts, options) => result?,
  };

  let elapsed = start.elapsed();
  info!(
    requested = stats.requested,
    fetched = stats.fetched,
    cached = stats.cached,
    bytes = stats.bytes,
    elapsed_ms = elapsed.as_millis() as u64,
    "prefetch complete"
  );

  Ok(FetchReport { stats, elapsed })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::artifact::{Fingerprint, LocalArtifact};
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CountingService {
    calls: AtomicUsize,
    fail: bool,
  }

  impl FetchService for CountingService {
    async fn prefetch(&self, artifacts: &[Artifact], _options: PrefetchOptions) -> Result<FetchStats, FetchError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.fail {
        return Err(FetchError::Failed("remote unavailable".to_string()));
      }
      Ok(FetchStats {
        requested: artifacts.len(),
        fetched: artifacts.len(),
        ..Default::default()
      })
    }
  }

  struct PendingService;

  impl FetchService for PendingService {
    async fn prefetch(&self, _artifacts: &[Artifact], _options: PrefetchOptions) -> Result<FetchStats, FetchError> {
      std::future::pending().await
    }
  }

  fn artifacts() -> Vec<Artifact> {
    vec![Artifact::Local(LocalArtifact::new(
      "a.jdeps",
      PathBuf::from("a.jdeps"),
      Fingerprint::Missing,
    ))]
  }

  #[tokio::test]
  async fn empty_batch_skips_service() {
    let service = CountingService {
      calls: AtomicUsize::new(0),
      fail: false,
    };

    let report = prefetch_artifacts(&service, &[], PrefetchOptions::default(), &CancelToken::new())
      .await
      .unwrap();

    assert_eq!(report.stats, FetchStats::default());
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn reports_service_stats() {
    let service = CountingService {
      calls: AtomicUsize::new(0),
      fail: false,
    };

    let report = prefetch_artifacts(&service, &artifacts(), PrefetchOptions::default(), &CancelToken::new())
      .await
      .unwrap();

    assert_eq!(report.stats.requested, 1);
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn service_failure_propagates() {
    let service = CountingService {
      calls: AtomicUsize::new(0),
      fail: true,
    };

    let result = prefetch_artifacts(&service, &artifacts(), PrefetchOptions::default(), &CancelToken::new()).await;

    assert!(matches!(result, Err(PrefetchError::Fetch(FetchError::Failed(_)))));
  }

  #[tokio::test]
  async fn cancellation_interrupts_wait() {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      trigger.cancel();
    });

    let result = prefetch_artifacts(&PendingService, &artifacts(), PrefetchOptions::default(), &cancel).await;

    assert!(matches!(result, Err(PrefetchError::Cancelled)));
  }
}
