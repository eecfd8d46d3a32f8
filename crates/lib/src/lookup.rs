//! Read-only view of resolved dependencies, keyed by target.

use std::collections::HashMap;
use std::sync::Arc;

use crate::state::DepsState;
use crate::target::TargetKey;

/// Maps each target to its explicit and implicit dependency paths.
///
/// Built once per successful load and never modified afterwards. Cloning is
/// cheap; clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct DependencyMap {
  inner: Arc<HashMap<TargetKey, Vec<String>>>,
}

impl DependencyMap {
  /// Build the view from a state. A later entry for the same target wins.
  pub fn from_state(state: &DepsState) -> Self {
    let mut map = HashMap::with_capacity(state.len());
    for entry in &state.entries {
      map.insert(entry.target.clone(), entry.dependencies.clone());
    }
    Self { inner: Arc::new(map) }
  }

  /// Dependency paths of `target`, in report order.
  pub fn get(&self, target: &TargetKey) -> Option<&[String]> {
    self.inner.get(target).map(Vec::as_slice)
  }

  pub fn contains(&self, target: &TargetKey) -> bool {
    self.inner.contains_key(target)
  }

  pub fn len(&self) -> usize {
    self.inner.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  /// Every target in the view, sorted.
  pub fn targets(&self) -> Vec<&TargetKey> {
    let mut targets: Vec<_> = self.inner.keys().collect();
    targets.sort();
    targets
  }
}

impl From<&DepsState> for DependencyMap {
  fn from(state: &DepsState) -> Self {
    Self::from_state(state)
  }
}
