use tokio::fs;
use tracing::debug;

use super::{FetchError, FetchService, FetchStats, PrefetchOptions};
use crate::artifact::Artifact;

/// Fetch service for builds whose reports are all on local disk.
///
/// Local artifacts need no transfer. A remote artifact only succeeds if its
/// content is already in the cache; otherwise the batch fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetchService;

impl LocalFetchService {
  pub fn new() -> Self {
    Self
  }
}

impl FetchService for LocalFetchService {
  async fn prefetch(&self, artifacts: &[Artifact], _options: PrefetchOptions) -> Result<FetchStats, FetchError> {
    let mut stats = FetchStats {
      requested: artifacts.len(),
      ..Default::default()
    };

    for artifact in artifacts {
      match artifact {
        Artifact::Local(_) => stats.cached += 1,
        Artifact::Remote(remote) => match fs::metadata(remote.cache_path()).await {
          Ok(_) => stats.cached += 1,
          Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FetchError::Missing {
              key: artifact.key().clone(),
              path: remote.cache_path().to_path_buf(),
            });
          }
          Err(source) => {
            return Err(FetchError::Io {
              path: remote.cache_path().to_path_buf(),
              source,
            });
          }
        },
      }
    }

    debug!(cached = stats.cached, "local prefetch complete");
    Ok(stats)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::artifact::{Fingerprint, LocalArtifact, RemoteArtifact};
  use std::path::PathBuf;
  use tempfile::TempDir;

  #[tokio::test]
  async fn local_artifacts_need_nothing() {
    let artifacts = vec![Artifact::Local(LocalArtifact::new(
      "missing.jdeps",
      PathBuf::from("/does/not/exist"),
      Fingerprint::Missing,
    ))];

    let stats = LocalFetchService::new()
      .prefetch(&artifacts, PrefetchOptions::default())
      .await
      .unwrap();

    assert_eq!(stats.cached, 1);
    assert_eq!(stats.fetched, 0);
  }

  #[tokio::test]
  async fn uncached_remote_fails() {
    let temp = TempDir::new().unwrap();
    let artifacts = vec![Artifact::Remote(RemoteArtifact::new(
      "r.jdeps",
      "cd".repeat(32),
      3,
      temp.path().join("cas/cdcd"),
    ))];

    let result = LocalFetchService::new().prefetch(&artifacts, PrefetchOptions::default()).await;

    assert!(matches!(result, Err(FetchError::Missing { .. })));
  }

  #[tokio::test]
  async fn cached_remote_succeeds() {
    let temp = TempDir::new().unwrap();
    let cached = temp.path().join("blob");
    std::fs::write(&cached, b"abc").unwrap();
    let artifacts = vec![Artifact::Remote(RemoteArtifact::new("r.jdeps", "cd".repeat(32), 3, cached))];

    let stats = LocalFetchService::new()
      .prefetch(&artifacts, PrefetchOptions::default())
      .await
      .unwrap();

    assert_eq!(stats.cached, 1);
  }
}
