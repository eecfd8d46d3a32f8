//! deptrack-lib: incremental loading of compiler dependency reports.
//!
//! Given a set of build targets and the dependency-report artifacts the compiler
//! emitted for them, this crate works out which reports changed since the last
//! run, fetches and decodes only those, and merges the result with the state
//! retained from earlier runs:
//! - `artifact`: report handles, fingerprints and resolution
//! - `diff`: partitions required artifacts into updated and removed
//! - `fetch`: bulk prefetch of changed artifacts
//! - `report`: decoding of the binary report format
//! - `pipeline`: the end-to-end load, with a bounded worker pool and cancellation
//! - `state`: persisted entries, merge, on-disk store and lock
//! - `lookup`: the read-only target -> dependencies view

pub mod artifact;
pub mod consts;
pub mod diff;
pub mod fetch;
pub mod lookup;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod state;
pub mod target;
pub mod util;

pub use artifact::{Artifact, ArtifactKey, ArtifactState, Fingerprint};
pub use lookup::DependencyMap;
pub use pipeline::{CancelToken, DepsLoader, LoadError, LoadOptions, LoadOutcome, LoadResult, WorkerPool};
pub use state::{DepsState, Entry};
pub use target::{TargetInfo, TargetKey};
