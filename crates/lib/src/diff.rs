//! Diff computation between prior fingerprints and required artifacts.
//!
//! The diff works on artifact keys: a required artifact is unchanged only if the
//! prior run recorded the same key with an identical fingerprint. Everything else
//! it requires is updated, and every prior record whose key is no longer required
//! is removed.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::artifact::{Artifact, ArtifactKey, ArtifactState, Fingerprint};

/// Partition of the required artifacts relative to the prior run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ArtifactsDiff {
  /// Required artifacts that are new or whose fingerprint changed.
  pub updated: Vec<Artifact>,

  /// Prior records whose key is absent from the required set.
  pub removed: Vec<ArtifactState>,

  /// Required artifacts whose fingerprint matches the prior run.
  pub unchanged: Vec<Artifact>,
}

impl ArtifactsDiff {
  /// Returns true if nothing needs to be fetched, parsed or evicted.
  pub fn is_empty(&self) -> bool {
    self.updated.is_empty() && self.removed.is_empty()
  }

  /// Total number of required artifacts.
  pub fn total_required(&self) -> usize {
    self.updated.len() + self.unchanged.len()
  }
}

/// Compute the diff between the prior fingerprints and the required artifacts.
///
/// # Arguments
///
/// * `prior` - Fingerprint records from the previous run (None on the first run)
/// * `required` - Artifacts this run needs
///
/// # Diff Logic
///
/// - No prior records: everything required is `updated`, nothing is `removed`
/// - Required and recorded with an equal fingerprint: `unchanged`
/// - Required otherwise: `updated`
/// - Recorded but no longer required: `removed`
///
/// A key required twice is counted once. The result is sorted by key, so equal
/// inputs always produce equal output.
pub fn diff_artifacts(prior: Option<&[ArtifactState]>, required: &[Artifact]) -> ArtifactsDiff {
  let mut diff = ArtifactsDiff::default();

  let mut by_key: BTreeMap<&ArtifactKey, &Artifact> = BTreeMap::new();
  for artifact in required {
    by_key.insert(artifact.key(), artifact);
  }

  let Some(prior) = prior else {
    diff.updated = by_key.into_values().cloned().collect();
    return diff;
  };

  let mut recorded: HashMap<&ArtifactKey, HashSet<&Fingerprint>> = HashMap::new();
  for state in prior {
    recorded.entry(&state.key).or_default().insert(&state.fingerprint);
  }

  for (key, artifact) in &by_key {
    let fingerprint = artifact.fingerprint();
    let matches = recorded.get(key).is_some_and(|fps| fps.contains(&fingerprint));
    if matches {
      diff.unchanged.push((*artifact).clone());
    } else {
      diff.updated.push((*artifact).clone());
    }
  }

  let mut seen = HashSet::new();
  for state in prior {
    if !by_key.contains_key(&state.key) && seen.insert(state) {
      diff.removed.push(state.clone());
    }
  }
  diff.removed.sort_by(|a, b| a.key.cmp(&b.key));

  diff
}
