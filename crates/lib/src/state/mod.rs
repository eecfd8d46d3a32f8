//! Persisted dependency state.
//!
//! [`DepsState`] is the only thing carried from one load to the next: an ordered
//! list of [`Entry`] values, each tying a target's relevant dependency paths to
//! the fingerprint of the report they were read from. A new state is always
//! derived from the old one by [`merge`]; nothing is edited in place.

pub mod lock;
pub mod store;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactKey, ArtifactState};
use crate::pipeline::ParseResult;
use crate::target::TargetKey;

pub use lock::{LockMode, StateLock, StateLockError};
pub use store::{StateError, StateStore};

/// One target's dependencies and the report they came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
  pub target: TargetKey,
  pub dependencies: Vec<String>,
  pub artifact: ArtifactState,
}

impl Entry {
  pub fn new(target: TargetKey, dependencies: Vec<String>, artifact: ArtifactState) -> Self {
    Self {
      target,
      dependencies,
      artifact,
    }
  }
}

impl From<ParseResult> for Entry {
  fn from(result: ParseResult) -> Self {
    Self {
      target: result.target,
      dependencies: result.dependencies,
      artifact: result.artifact,
    }
  }
}

/// All entries retained between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepsState {
  pub entries: Vec<Entry>,
}

impl DepsState {
  pub fn new(entries: Vec<Entry>) -> Self {
    Self { entries }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Fingerprint records of every retained entry, in entry order.
  pub fn fingerprints(&self) -> Vec<ArtifactState> {
    self.entries.iter().map(|e| e.artifact.clone()).collect()
  }

  /// The entry for a target, if one is retained.
  pub fn get(&self, target: &TargetKey) -> Option<&Entry> {
    self.entries.iter().rev().find(|e| &e.target == target)
  }

  /// Total number of dependency paths across all entries.
  pub fn dependency_count(&self) -> usize {
    self.entries.iter().map(|e| e.dependencies.len()).sum()
  }
}

/// Derive the next state from the prior one and this run's deltas.
///
/// Prior entries backed by an updated or removed artifact are dropped, along with
/// any prior entry for a target that received a fresh result. Fresh results are
/// appended in the order given.
///
/// Matching is by artifact key, so a changed report evicts its old entry even
/// though the old fingerprint differs from the new one.
pub fn merge(
  prior: Option<&DepsState>,
  updated: &[Artifact],
  removed: &[ArtifactState],
  results: impl IntoIterator<Item = ParseResult>,
) -> DepsState {
  let fresh: Vec<Entry> = results.into_iter().map(Entry::from).collect();

  let stale: HashSet<&ArtifactKey> = updated
    .iter()
    .map(Artifact::key)
    .chain(removed.iter().map(|s| &s.key))
    .collect();
  let refreshed: HashSet<&TargetKey> = fresh.iter().map(|e| &e.target).collect();

  let mut entries: Vec<Entry> = prior
    .map(|state| {
      state
        .entries
        .iter()
        .filter(|e| !stale.contains(&e.artifact.key) && !refreshed.contains(&e.target))
        .cloned()
        .collect()
    })
    .unwrap_or_default();

  entries.extend(fresh);
  DepsState::new(entries)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::artifact::{Fingerprint, LocalArtifact};
  use std::path::PathBuf;

  fn fp(modified_ms: u64) -> Fingerprint {
    Fingerprint::Modified { modified_ms, size: 1 }
  }

  fn entry(target: &str, deps: &[&str], key: &str, fingerprint: Fingerprint) -> Entry {
    Entry::new(
      TargetKey::new(target),
      deps.iter().map(|d| d.to_string()).collect(),
      ArtifactState::new(key, fingerprint),
    )
  }

  fn artifact(key: &str, fingerprint: Fingerprint) -> Artifact {
    Artifact::Local(LocalArtifact::new(key, PathBuf::from(key), fingerprint))
  }

  fn result(target: &str, deps: &[&str], key: &str, fingerprint: Fingerprint) -> ParseResult {
    ParseResult {
      artifact: ArtifactState::new(key, fingerprint),
      target: TargetKey::new(target),
      dependencies: deps.iter().map(|d| d.to_string()).collect(),
    }
  }

  #[test]
  fn first_merge_takes_results() {
    let state = merge(None, &[artifact("a", fp(1))], &[], vec![result("//t:a", &["x.jar"], "a", fp(1))]);

    assert_eq!(state.entries, vec![entry("//t:a", &["x.jar"], "a", fp(1))]);
  }

  #[test]
  fn no_deltas_keeps_prior() {
    let prior = DepsState::new(vec![
      entry("//t:a", &["a.jar", "b.jar"], "a", fp(1)),
      entry("//t:b", &["c.jar"], "b", fp(2)),
    ]);

    let state = merge(Some(&prior), &[], &[], Vec::new());

    assert_eq!(state, prior);
  }

  #[test]
  fn updated_artifact_replaces_entry() {
    let prior = DepsState::new(vec![
      entry("//t:a", &["old.jar"], "a", fp(1)),
      entry("//t:b", &["b.jar"], "b", fp(2)),
    ]);

    let state = merge(
      Some(&prior),
      &[artifact("a", fp(9))],
      &[],
      vec![result("//t:a", &["new.jar"], "a", fp(9))],
    );

    assert_eq!(
      state.entries,
      vec![
        entry("//t:b", &["b.jar"], "b", fp(2)),
        entry("//t:a", &["new.jar"], "a", fp(9)),
      ]
    );
  }

  #[test]
  fn updated_artifact_without_result_drops_entry() {
    let prior = DepsState::new(vec![entry("//t:a", &["old.jar"], "a", fp(1))]);

    let state = merge(Some(&prior), &[artifact("a", fp(2))], &[], Vec::new());

    assert!(state.is_empty());
  }

  #[test]
  fn removed_artifact_drops_entry() {
    let prior = DepsState::new(vec![
      entry("//t:gone", &["a.jar"], "gone", fp(1)),
      entry("//t:kept", &["b.jar"], "kept", fp(1)),
    ]);

    let state = merge(Some(&prior), &[], &[ArtifactState::new("gone", fp(1))], Vec::new());

    assert!(state.get(&TargetKey::new("//t:gone")).is_none());
    assert!(state.get(&TargetKey::new("//t:kept")).is_some());
  }

  #[test]
  fn target_moved_to_new_artifact_keeps_single_entry() {
    let prior = DepsState::new(vec![entry("//t:a", &["old.jar"], "old", fp(1))]);

    let state = merge(
      Some(&prior),
      &[artifact("new", fp(1))],
      &[],
      vec![result("//t:a", &["new.jar"], "new", fp(1))],
    );

    assert_eq!(state.entries, vec![entry("//t:a", &["new.jar"], "new", fp(1))]);
  }

  #[test]
  fn fingerprints_follow_entries() {
    let state = DepsState::new(vec![entry("//t:a", &[], "a", fp(1)), entry("//t:b", &[], "b", fp(2))]);

    assert_eq!(
      state.fingerprints(),
      vec![ArtifactState::new("a", fp(1)), ArtifactState::new("b", fp(2))]
    );
  }
}
