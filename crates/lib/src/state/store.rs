//! On-disk storage for [`DepsState`].
//!
//! # Storage Layout
//!
//! ```text
//! {data_dir}/
//! ├── deps-state.json      # versioned DepsState
//! └── .lock                # held while a load is in progress
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{DepsState, Entry};
use crate::consts::{STATE_FILENAME, STATE_VERSION};
use crate::paths::data_dir;

/// Errors that can occur while storing state.
#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to read state: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write state: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse state: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported state version {0}, expected {STATE_VERSION}")]
  UnsupportedVersion(u32),

  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),
}

#[derive(Serialize)]
struct StateFileRef<'a> {
  version: u32,
  entries: &'a [Entry],
}

#[derive(Deserialize)]
struct StateFile {
  version: u32,
  entries: Vec<Entry>,
}

/// Reads and writes the state file.
///
/// Writes are atomic: a temp file is written next to the target and renamed over it.
#[derive(Debug, Clone)]
pub struct StateStore {
  base_path: PathBuf,
}

impl StateStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  /// Store in the platform data directory.
  pub fn default_store() -> Self {
    Self::new(data_dir())
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  pub fn state_path(&self) -> PathBuf {
    self.base_path.join(STATE_FILENAME)
  }

  /// Load the stored state.
  ///
  /// Returns `Ok(None)` if nothing was stored yet.
  pub fn load(&self) -> Result<Option<DepsState>, StateError> {
    let path = self.state_path();

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(StateError::Read(e)),
    };

    let file: StateFile = serde_json::from_str(&content).map_err(StateError::Parse)?;

    if file.version != STATE_VERSION {
      return Err(StateError::UnsupportedVersion(file.version));
    }

    debug!(path = %path.display(), entries = file.entries.len(), "loaded state");
    Ok(Some(DepsState::new(file.entries)))
  }

  /// Replace the stored state.
  pub fn save(&self, state: &DepsState) -> Result<(), StateError> {
    fs::create_dir_all(&self.base_path).map_err(StateError::CreateDir)?;

    let path = self.state_path();
    let temp_path = self.base_path.join(format!("{}.tmp", STATE_FILENAME));

    let file = StateFileRef {
      version: STATE_VERSION,
      entries: &state.entries,
    };
    let content = serde_json::to_string_pretty(&file).map_err(StateError::Serialize)?;
    fs::write(&temp_path, &content).map_err(StateError::Write)?;
    fs::rename(&temp_path, &path).map_err(StateError::Write)?;

    debug!(path = %path.display(), entries = state.len(), "saved state");
    Ok(())
  }

  /// Forget the stored state. Succeeds if there was none.
  pub fn clear(&self) -> Result<bool, StateError> {
    match fs::remove_file(self.state_path()) {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(StateError::Write(e)),
    }
  }
}
