use anyhow::{Context, Result};

use deptrack_lib::state::{LockMode, StateLock, StateStore};

use crate::output::{print_info, print_success};

/// Remove the stored state so the next load starts from scratch.
pub fn cmd_clear() -> Result<()> {
  let store = StateStore::default_store();
  let _lock = StateLock::acquire(store.base_path(), LockMode::Exclusive, "deptrack clear")?;

  if store.clear().context("Failed to clear state")? {
    print_success("Stored state cleared");
  } else {
    print_info("No stored state to clear");
  }

  Ok(())
}
