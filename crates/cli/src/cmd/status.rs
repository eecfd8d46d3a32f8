//! Status command implementation.
//!
//! Displays the stored state: entry and dependency counts, plus cache usage.

use std::path::Path;

use anyhow::Result;

use deptrack_lib::consts::CAS_DIR;
use deptrack_lib::paths::cache_dir;
use deptrack_lib::state::{LockMode, StateLock, StateStore};

use crate::output::{self, format_bytes, print_error, print_info, print_json, print_stat, print_success};

pub fn cmd_status(verbose: bool, json: bool) -> Result<()> {
  let store = StateStore::default_store();
  let _lock = StateLock::acquire(store.base_path(), LockMode::Shared, "deptrack status")?;

  let state = match store.load() {
    Ok(Some(state)) => state,
    Ok(None) => {
      print_info("No stored state found. Run 'deptrack load' to create it.");
      return Ok(());
    }
    Err(e) => {
      print_error(&format!("Error loading state: {}", e));
      return Err(e.into());
    }
  };

  let state_size = std::fs::metadata(store.state_path()).map(|m| m.len()).unwrap_or(0);
  let cache_usage = dir_size(&cache_dir().join(CAS_DIR));

  if json {
    let targets: Vec<_> = state
      .entries
      .iter()
      .map(|e| {
        serde_json::json!({
          "target": e.target.to_string(),
          "artifact": e.artifact.key.0,
          "dependencies": e.dependencies.len(),
        })
      })
      .collect();
    let json_output = serde_json::json!({
      "state_path": store.state_path(),
      "entries": state.len(),
      "dependencies": state.dependency_count(),
      "state_bytes": state_size,
      "cache_bytes": cache_usage,
      "targets": targets,
    });
    print_json(&json_output)?;
  } else {
    print_success(&format!("State: {}", store.state_path().display()));
    print_stat("Entries", &state.len().to_string());
    print_stat("Dependencies", &state.dependency_count().to_string());
    print_stat("State size", &format_bytes(state_size));
    print_stat("Cache usage", &format_bytes(cache_usage));

    if verbose && !state.is_empty() {
      println!();
      println!("Targets:");
      for entry in &state.entries {
        println!(
          "  {} {} ({} deps)",
          output::symbols::INFO,
          entry.target,
          entry.dependencies.len()
        );
      }
    }
  }

  Ok(())
}

fn dir_size(path: &Path) -> u64 {
  if !path.exists() {
    return 0;
  }

  let mut size = 0;
  if let Ok(entries) = std::fs::read_dir(path) {
    for entry in entries.flatten() {
      let entry_path = entry.path();
      if entry_path.is_file() {
        size += entry.metadata().map(|m| m.len()).unwrap_or(0);
      } else if entry_path.is_dir() {
        size += dir_size(&entry_path);
      }
    }
  }
  size
}
