//! Resolution of declared report references into concrete artifacts.
//!
//! Targets declare their report as an [`ArtifactRef`]: an execution-root relative
//! path, plus a digest when the bytes live in a remote cache. A resolver turns
//! that into an [`Artifact`] with a fingerprint, without reading the content
//! unless [`FingerprintMode::Content`] asks for it.

use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Artifact, ArtifactError, ArtifactKey, Fingerprint, LocalArtifact, RemoteArtifact};
use crate::consts::CAS_DIR;
use crate::util::hash::{hash_file, is_sha256_hex};

/// A report artifact as declared by target metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
  /// Output root fragment, e.g. `bazel-out/k8-fastbuild/bin`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub root: Option<String>,

  /// Path below the root.
  pub relative_path: String,

  /// SHA-256 of the content when it is held by a remote cache.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub digest: Option<String>,

  /// Content length, if known.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub size: Option<u64>,
}

impl ArtifactRef {
  /// A local reference at `relative_path` below the execution root.
  pub fn local(relative_path: impl Into<String>) -> Self {
    Self {
      root: None,
      relative_path: relative_path.into(),
      digest: None,
      size: None,
    }
  }

  /// A remote reference with a known digest and size.
  pub fn remote(relative_path: impl Into<String>, digest: impl Into<String>, size: u64) -> Self {
    Self {
      root: None,
      relative_path: relative_path.into(),
      digest: Some(digest.into()),
      size: Some(size),
    }
  }

  /// Execution-root relative path, which doubles as the artifact key.
  pub fn exec_path(&self) -> String {
    match self.root.as_deref().map(|r| r.trim_end_matches('/')) {
      Some(root) if !root.is_empty() => format!("{}/{}", root, self.relative_path),
      _ => self.relative_path.clone(),
    }
  }
}

/// Maps declared references to concrete artifacts.
pub trait ArtifactResolver: Send + Sync {
  fn resolve(&self, reference: &ArtifactRef) -> Result<Artifact, ArtifactError>;
}

/// How local artifacts are fingerprinted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
  /// Modification time and size. Cheap; never reads content.
  #[default]
  Metadata,
  /// SHA-256 of the content. Survives touch-only rebuilds.
  Content,
}

/// Resolves references against a local execution root and cache directory.
#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
  exec_root: PathBuf,
  cache_dir: PathBuf,
  mode: FingerprintMode,
}

impl WorkspaceResolver {
  pub fn new(exec_root: PathBuf, cache_dir: PathBuf) -> Self {
    let exec_root = dunce::canonicalize(&exec_root).unwrap_or(exec_root);
    Self {
      exec_root,
      cache_dir,
      mode: FingerprintMode::default(),
    }
  }

  pub fn with_mode(mut self, mode: FingerprintMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn exec_root(&self) -> &Path {
    &self.exec_root
  }

  /// Location of a digest in the content-addressed cache.
  pub fn cas_path(&self, sha256: &str) -> PathBuf {
    cas_path(&self.cache_dir, sha256)
  }

  fn fingerprint_local(&self, path: &Path) -> Result<Fingerprint, ArtifactError> {
    let metadata = match std::fs::metadata(path) {
      Ok(metadata) => metadata,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "dependency report not present at resolve time");
        return Ok(Fingerprint::Missing);
      }
      Err(e) => return Err(ArtifactError::from_io(path, e)),
    };

    match self.mode {
      FingerprintMode::Metadata => {
        let modified_ms = metadata
          .modified()
          .map_err(|e| ArtifactError::from_io(path, e))?
          .duration_since(UNIX_EPOCH)
          .map(|d| d.as_millis() as u64)
          .unwrap_or(0);
        Ok(Fingerprint::Modified {
          modified_ms,
          size: metadata.len(),
        })
      }
      FingerprintMode::Content => match hash_file(path) {
        Ok((sha256, size)) => Ok(Fingerprint::Digest { sha256, size }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Fingerprint::Missing),
        Err(e) => Err(ArtifactError::from_io(path, e)),
      },
    }
  }
}

impl ArtifactResolver for WorkspaceResolver {
  fn resolve(&self, reference: &ArtifactRef) -> Result<Artifact, ArtifactError> {
    let exec_path = reference.exec_path();
    if reference.relative_path.is_empty() {
      return Err(ArtifactError::InvalidReference {
        reference: exec_path,
        message: "empty relative path".to_string(),
      });
    }

    if let Some(digest) = &reference.digest {
      let sha256 = digest.to_ascii_lowercase();
      if !is_sha256_hex(&sha256) {
        return Err(ArtifactError::InvalidReference {
          reference: exec_path,
          message: format!("'{}' is not a sha256 digest", digest),
        });
      }
      let cache_path = self.cas_path(&sha256);
      return Ok(Artifact::Remote(RemoteArtifact::new(
        ArtifactKey(exec_path),
        sha256,
        reference.size.unwrap_or(0),
        cache_path,
      )));
    }

    let path = self.exec_root.join(&exec_path);
    let fingerprint = self.fingerprint_local(&path)?;
    Ok(Artifact::Local(LocalArtifact::new(ArtifactKey(exec_path), path, fingerprint)))
  }
}

/// Location of a digest below a cache directory.
pub fn cas_path(cache_dir: &Path, sha256: &str) -> PathBuf {
  cache_dir.join(CAS_DIR).join(sha256)
}
