//! Implementation of the `deptrack show` command.

use anyhow::{Context, Result, bail};
use serde::Serialize;

use deptrack_lib::state::{LockMode, StateLock, StateStore};
use deptrack_lib::{DependencyMap, TargetKey};

use crate::output::print_json;

#[derive(Serialize)]
struct ShowOutput<'a> {
  target: String,
  dependencies: &'a [String],
}

/// Print the dependencies recorded for one target, one path per line.
pub fn cmd_show(label: &str, aspects: Vec<String>, json: bool) -> Result<()> {
  let store = StateStore::default_store();
  let _lock = StateLock::acquire(store.base_path(), LockMode::Shared, "deptrack show")?;

  let Some(state) = store.load().context("Failed to load stored state")? else {
    bail!("no stored state, run 'deptrack load' first");
  };

  let key = TargetKey::with_aspects(label, aspects);
  let map = DependencyMap::from_state(&state);
  let Some(dependencies) = map.get(&key) else {
    bail!("no dependency data for {}", key);
  };

  if json {
    print_json(&ShowOutput {
      target: key.to_string(),
      dependencies,
    })?;
  } else {
    for path in dependencies {
      println!("{}", path);
    }
  }

  Ok(())
}
