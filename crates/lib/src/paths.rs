//! Platform directories for state and cached artifacts.

use std::path::PathBuf;

use crate::consts::{APP_NAME, CACHE_DIR_ENV, DATA_DIR_ENV};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the directory holding persisted state.
///
/// `DEPTRACK_DATA_DIR` wins when set; otherwise the platform data directory.
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
    return PathBuf::from(dir);
  }
  platform_data_dir()
}

/// Returns the directory holding cached report bytes.
///
/// `DEPTRACK_CACHE_DIR` wins when set; otherwise the platform cache directory.
pub fn cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
    return PathBuf::from(dir);
  }
  platform_cache_dir()
}

#[cfg(windows)]
fn platform_data_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

#[cfg(not(windows))]
fn platform_data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

#[cfg(windows)]
fn platform_cache_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
    .join("Cache")
}

#[cfg(not(windows))]
fn platform_cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

#[cfg(test)]
#[cfg(not(windows))]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  fn override_env_takes_precedence() {
    temp_env::with_vars(
      [
        (DATA_DIR_ENV, Some("/custom/data")),
        (CACHE_DIR_ENV, Some("/custom/cache")),
        ("XDG_DATA_HOME", Some("/xdg/data")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/custom/data"));
        assert_eq!(cache_dir(), PathBuf::from("/custom/cache"));
      },
    );
  }

  #[test]
  #[serial]
  fn xdg_dirs_used_without_override() {
    temp_env::with_vars(
      [
        (DATA_DIR_ENV, None::<&str>),
        (CACHE_DIR_ENV, None::<&str>),
        ("XDG_DATA_HOME", Some("/xdg/data")),
        ("XDG_CACHE_HOME", Some("/xdg/cache")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/xdg/data").join(APP_NAME));
        assert_eq!(cache_dir(), PathBuf::from("/xdg/cache").join(APP_NAME));
      },
    );
  }

  #[test]
  #[serial]
  fn fallback_to_home_directories() {
    temp_env::with_vars(
      [
        (DATA_DIR_ENV, None::<&str>),
        (CACHE_DIR_ENV, None::<&str>),
        ("XDG_DATA_HOME", None::<&str>),
        ("XDG_CACHE_HOME", None::<&str>),
        ("HOME", Some("/home/user")),
      ],
      || {
        assert_eq!(data_dir(), PathBuf::from("/home/user/.local/share").join(APP_NAME));
        assert_eq!(cache_dir(), PathBuf::from("/home/user/.cache").join(APP_NAME));
      },
    );
  }
}
