use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::{FetchError, FetchService, FetchStats, PrefetchOptions};
use crate::artifact::{Artifact, ArtifactKey, RemoteArtifact};
use crate::util::hash::hash_bytes;

/// Fetches remote artifacts from a content-addressed directory.
///
/// The remote side stores each blob as `<remote_root>/<sha256>`; this is how a
/// mounted or synced cache volume is laid out. Blobs are copied into each
/// artifact's cache path and verified against the expected digest. Artifacts
/// already cached with the right digest are not copied again, and a digest
/// requested under several keys is copied once.
#[derive(Debug, Clone)]
pub struct DirectoryFetchService {
  remote_root: PathBuf,
  parallelism: usize,
}

enum Outcome {
  Fetched(u64),
  Cached,
}

impl DirectoryFetchService {
  pub fn new(remote_root: PathBuf) -> Self {
    Self {
      remote_root,
      parallelism: 8,
    }
  }

  /// Maximum number of concurrent copies.
  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  pub fn remote_root(&self) -> &Path {
    &self.remote_root
  }
}

impl FetchService for DirectoryFetchService {
  async fn prefetch(&self, artifacts: &[Artifact], options: PrefetchOptions) -> Result<FetchStats, FetchError> {
    let mut stats = FetchStats {
      requested: artifacts.len(),
      ..Default::default()
    };

    let semaphore = Arc::new(Semaphore::new(self.parallelism));
    let mut join_set: JoinSet<Result<Outcome, FetchError>> = JoinSet::new();
    let mut digests = HashSet::new();

    for artifact in artifacts {
      let Artifact::Remote(remote) = artifact else {
        stats.cached += 1;
        continue;
      };
      // Same digest, same cache path.
      if !digests.insert(remote.sha256()) {
        debug!(artifact = %artifact.key(), digest = %remote.sha256(), "digest already requested");
        stats.cached += 1;
        continue;
      }

      let remote = remote.clone();
      let key = artifact.key().clone();
      let source = self.remote_root.join(remote.sha256());
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        let _permit = semaphore
          .acquire()
          .await
          .map_err(|e| FetchError::Join(e.to_string()))?;
        fetch_one(&key, &remote, &source).await
      });
    }

    debug!(tasks = join_set.len(), priority = ?options.priority, "copying remote artifacts");

    while let Some(join_result) = join_set.join_next().await {
      match join_result {
        Ok(Ok(Outcome::Fetched(bytes))) => {
          stats.fetched += 1;
          stats.bytes += bytes;
        }
        Ok(Ok(Outcome::Cached)) => stats.cached += 1,
        Ok(Err(e)) => {
          join_set.abort_all();
          return Err(e);
        }
        Err(e) => {
          error!(error = %e, "fetch task panicked");
          join_set.abort_all();
          return Err(FetchError::Join(e.to_string()));
        }
      }
    }

    Ok(stats)
  }
}

async fn fetch_one(key: &ArtifactKey, remote: &RemoteArtifact, source: &Path) -> Result<Outcome, FetchError> {
  let dest = remote.cache_path();
  let expected = remote.sha256();

  if let Ok(existing) = fs::read(dest).await {
    let actual = hash_bytes(&existing);
    if actual == expected {
      debug!(artifact = %key, "already cached");
      return Ok(Outcome::Cached);
    }
    debug!(artifact = %key, expected = %expected, actual = %actual, "cached blob hash mismatch, fetching again");
  }

  let bytes = match fs::read(source).await {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      return Err(FetchError::Missing {
        key: key.clone(),
        path: source.to_path_buf(),
      });
    }
    Err(source_err) => {
      return Err(FetchError::Io {
        path: source.to_path_buf(),
        source: source_err,
      });
    }
  };

  let actual = hash_bytes(&bytes);
  if actual != expected {
    return Err(FetchError::DigestMismatch {
      key: key.clone(),
      expected: expected.to_string(),
      actual,
    });
  }

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).await.map_err(io_err(parent))?;
  }

  let size = bytes.len() as u64;
  let dest_path = dest.to_path_buf();
  tokio::task::spawn_blocking(move || place(&dest_path, &bytes))
    .await
    .map_err(|e| FetchError::Join(e.to_string()))??;

  info!(artifact = %key, size, "fetched");
  Ok(Outcome::Fetched(size))
}

/// Write `bytes` to a private temp file next to `dest`, then rename it over `dest`.
fn place(dest: &Path, bytes: &[u8]) -> Result<(), FetchError> {
  let parent = dest.parent().unwrap_or_else(|| Path::new("."));
  let mut temp = NamedTempFile::new_in(parent).map_err(io_err(parent))?;
  temp.write_all(bytes).map_err(io_err(temp.path()))?;
  temp.flush().map_err(io_err(temp.path()))?;
  temp.persist(dest).map_err(|e| FetchError::Io {
    path: dest.to_path_buf(),
    source: e.error,
  })?;
  Ok(())
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> FetchError + use<> {
  let path = path.to_path_buf();
  move |source| FetchError::Io { path, source }
}
