//! Dependency-report artifacts.
//!
//! An [`Artifact`] is a handle to one compiler-emitted report. Artifacts are
//! identified by an [`ArtifactKey`] (their execution-root relative path) and
//! carry a [`Fingerprint`] that changes whenever their content does, so change
//! detection never needs to read the bytes.
//!
//! Two kinds exist:
//! - [`LocalArtifact`]: a file in the build's output tree
//! - [`RemoteArtifact`]: content held by a remote cache, addressed by digest and
//!   materialized into the local content-addressed cache by a fetch service
//!
//! The kind is settled once, at resolution time; everything downstream goes
//! through the uniform methods on [`Artifact`].

pub mod resolve;

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use resolve::{ArtifactRef, ArtifactResolver, FingerprintMode, WorkspaceResolver};

/// Logical identity of a report artifact, stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactKey(pub String);

impl fmt::Display for ArtifactKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl From<&str> for ArtifactKey {
  fn from(value: &str) -> Self {
    Self(value.to_string())
  }
}

impl From<String> for ArtifactKey {
  fn from(value: String) -> Self {
    Self(value)
  }
}

/// Comparable summary of an artifact's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fingerprint {
  /// Local file identified by modification time and length.
  Modified { modified_ms: u64, size: u64 },
  /// Content digest (remote artifacts, or local ones hashed in content mode).
  Digest { sha256: String, size: u64 },
  /// The file did not exist when it was resolved.
  Missing,
}

impl Fingerprint {
  /// Length in bytes recorded with the fingerprint (0 when missing).
  pub fn size(&self) -> u64 {
    match self {
      Fingerprint::Modified { size, .. } | Fingerprint::Digest { size, .. } => *size,
      Fingerprint::Missing => 0,
    }
  }
}

/// Persisted fingerprint record of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactState {
  pub key: ArtifactKey,
  pub fingerprint: Fingerprint,
}

impl ArtifactState {
  pub fn new(key: impl Into<ArtifactKey>, fingerprint: Fingerprint) -> Self {
    Self {
      key: key.into(),
      fingerprint,
    }
  }
}

/// Errors raised while resolving or reading an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
  /// The artifact's bytes are not present.
  #[error("artifact not found: {0}")]
  NotFound(PathBuf),

  /// Reading the artifact or its metadata failed.
  #[error("failed to access artifact {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The reference cannot be turned into an artifact.
  #[error("invalid artifact reference {reference}: {message}")]
  InvalidReference { reference: String, message: String },
}

impl ArtifactError {
  pub(crate) fn from_io(path: &Path, source: io::Error) -> Self {
    if source.kind() == io::ErrorKind::NotFound {
      ArtifactError::NotFound(path.to_path_buf())
    } else {
      ArtifactError::Io {
        path: path.to_path_buf(),
        source,
      }
    }
  }

  /// Returns true if the artifact vanished or was never materialized.
  pub fn is_not_found(&self) -> bool {
    matches!(self, ArtifactError::NotFound(_))
  }
}

/// A report file in the local output tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalArtifact {
  key: ArtifactKey,
  path: PathBuf,
  fingerprint: Fingerprint,
}

impl LocalArtifact {
  pub fn new(key: impl Into<ArtifactKey>, path: PathBuf, fingerprint: Fingerprint) -> Self {
    Self {
      key: key.into(),
      path,
      fingerprint,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

/// A report held by a remote cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteArtifact {
  key: ArtifactKey,
  sha256: String,
  size: u64,
  cache_path: PathBuf,
}

impl RemoteArtifact {
  pub fn new(key: impl Into<ArtifactKey>, sha256: String, size: u64, cache_path: PathBuf) -> Self {
    Self {
      key: key.into(),
      sha256,
      size,
      cache_path,
    }
  }

  pub fn sha256(&self) -> &str {
    &self.sha256
  }

  pub fn size(&self) -> u64 {
    self.size
  }

  /// Where a fetch service materializes the content.
  pub fn cache_path(&self) -> &Path {
    &self.cache_path
  }
}

/// A resolved dependency-report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Artifact {
  Local(LocalArtifact),
  Remote(RemoteArtifact),
}

impl Artifact {
  pub fn key(&self) -> &ArtifactKey {
    match self {
      Artifact::Local(local) => &local.key,
      Artifact::Remote(remote) => &remote.key,
    }
  }

  pub fn fingerprint(&self) -> Fingerprint {
    match self {
      Artifact::Local(local) => local.fingerprint.clone(),
      Artifact::Remote(remote) => Fingerprint::Digest {
        sha256: remote.sha256.clone(),
        size: remote.size,
      },
    }
  }

  /// The record persisted for this artifact.
  pub fn state(&self) -> ArtifactState {
    ArtifactState {
      key: self.key().clone(),
      fingerprint: self.fingerprint(),
    }
  }

  /// Length in bytes as known at resolution time.
  pub fn length(&self) -> u64 {
    match self {
      Artifact::Local(local) => local.fingerprint.size(),
      Artifact::Remote(remote) => remote.size,
    }
  }

  /// Path the bytes are read from.
  pub fn read_path(&self) -> &Path {
    match self {
      Artifact::Local(local) => &local.path,
      Artifact::Remote(remote) => &remote.cache_path,
    }
  }

  /// Open the artifact's byte stream.
  ///
  /// Fails with [`ArtifactError::NotFound`] if the bytes vanished (or, for remote
  /// artifacts, were never fetched).
  pub fn open(&self) -> Result<File, ArtifactError> {
    let path = self.read_path();
    File::open(path).map_err(|e| ArtifactError::from_io(path, e))
  }
}

impl fmt::Display for Artifact {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Artifact::Local(local) => write!(f, "{}", local.key),
      Artifact::Remote(remote) => write!(f, "{}@{}", remote.key, remote.sha256),
    }
  }
}
