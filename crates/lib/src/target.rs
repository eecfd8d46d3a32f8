//! Build targets and the targets manifest.
//!
//! The manifest is how the surrounding build workflow tells this crate which
//! targets to load and where each target's dependency report lives.
//!
//! # Manifest Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "targets": [
//!     {
//!       "label": "//java/com/example:lib",
//!       "deps_report": {
//!         "root": "bazel-out/k8-fastbuild/bin",
//!         "relative_path": "java/com/example/liblib.jdeps"
//!       }
//!     }
//!   ]
//! }
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactRef;
use crate::consts::TARGETS_VERSION;

/// Unique key of a build target: its label plus any aspects applied to it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TargetKey {
  pub label: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub aspects: Vec<String>,
}

impl TargetKey {
  pub fn new(label: impl Into<String>) -> Self {
    Self {
      label: label.into(),
      aspects: Vec::new(),
    }
  }

  pub fn with_aspects(label: impl Into<String>, aspects: Vec<String>) -> Self {
    Self {
      label: label.into(),
      aspects,
    }
  }
}

impl fmt::Display for TargetKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.aspects.is_empty() {
      write!(f, "{}", self.label)
    } else {
      write!(f, "{}#{}", self.label, self.aspects.join(","))
    }
  }
}

/// Metadata for one target under consideration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
  pub label: String,

  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub aspects: Vec<String>,

  /// The target's dependency report, if it has one.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deps_report: Option<ArtifactRef>,
}

impl TargetInfo {
  pub fn new(label: impl Into<String>, deps_report: Option<ArtifactRef>) -> Self {
    Self {
      label: label.into(),
      aspects: Vec::new(),
      deps_report,
    }
  }

  pub fn key(&self) -> TargetKey {
    TargetKey::with_aspects(self.label.clone(), self.aspects.clone())
  }
}

/// The list of targets to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetManifest {
  pub version: u32,
  pub targets: Vec<TargetInfo>,
}

/// Errors that can occur when loading a targets manifest.
#[derive(Debug, Error)]
pub enum TargetsError {
  #[error("targets manifest not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read targets manifest: {0}")]
  Read(#[source] io::Error),

  #[error("failed to parse targets manifest: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize targets manifest: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write targets manifest: {0}")]
  Write(#[source] io::Error),

  #[error("unsupported targets manifest version {0}, expected {TARGETS_VERSION}")]
  UnsupportedVersion(u32),
}

impl Default for TargetManifest {
  fn default() -> Self {
    Self::new(Vec::new())
  }
}

impl TargetManifest {
  pub fn new(targets: Vec<TargetInfo>) -> Self {
    Self {
      version: TARGETS_VERSION,
      targets,
    }
  }

  /// Load a manifest from disk.
  pub fn load(path: &Path) -> Result<Self, TargetsError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(TargetsError::NotFound(path.to_path_buf())),
      Err(e) => return Err(TargetsError::Read(e)),
    };

    let manifest: TargetManifest = serde_json::from_str(&content).map_err(TargetsError::Parse)?;

    if manifest.version != TARGETS_VERSION {
      return Err(TargetsError::UnsupportedVersion(manifest.version));
    }

    Ok(manifest)
  }

  pub fn save(&self, path: &Path) -> Result<(), TargetsError> {
    let content = serde_json::to_string_pretty(self).map_err(TargetsError::Serialize)?;
    fs::write(path, content).map_err(TargetsError::Write)
  }
}
