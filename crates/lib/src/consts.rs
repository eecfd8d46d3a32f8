/// Application name, used for data and cache directory names.
pub const APP_NAME: &str = "deptrack";

/// File name of the persisted dependency state within the data directory.
pub const STATE_FILENAME: &str = "deps-state.json";

/// Current state file format version.
pub const STATE_VERSION: u32 = 1;

/// Current targets manifest format version.
pub const TARGETS_VERSION: u32 = 1;

/// Directory within the cache holding content-addressed report bytes.
pub const CAS_DIR: &str = "cas";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DEPTRACK_DATA_DIR";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "DEPTRACK_CACHE_DIR";
