//! End-to-end loads through the public API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use deptrack_lib::artifact::{ArtifactRef, ArtifactResolver, FingerprintMode, WorkspaceResolver};
use deptrack_lib::fetch::{
  DirectoryFetchService, FetchError, FetchService, FetchStats, LocalFetchService, PrefetchOptions,
};
use deptrack_lib::report::{DependencyKind, DependencyRecord, DepsReport};
use deptrack_lib::state::StateStore;
use deptrack_lib::util::hash::hash_bytes;
use deptrack_lib::{
  Artifact, CancelToken, DepsLoader, DepsState, Entry, LoadError, LoadOutcome, LoadResult, TargetInfo, TargetKey,
  WorkerPool,
};
use tempfile::TempDir;

struct Workspace {
  _temp: TempDir,
  exec: PathBuf,
  cache: PathBuf,
  remote: PathBuf,
  data: PathBuf,
}

impl Workspace {
  fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let exec = temp.path().join("exec");
    let cache = temp.path().join("cache");
    let remote = temp.path().join("remote");
    let data = temp.path().join("data");
    for dir in [&exec, &cache, &remote, &data] {
      std::fs::create_dir_all(dir).unwrap();
    }
    Self {
      _temp: temp,
      exec,
      cache,
      remote,
      data,
    }
  }

  fn resolver(&self) -> WorkspaceResolver {
    WorkspaceResolver::new(self.exec.clone(), self.cache.clone()).with_mode(FingerprintMode::Content)
  }

  fn loader(&self) -> DepsLoader<WorkspaceResolver, LocalFetchService> {
    DepsLoader::new(self.resolver(), LocalFetchService::new(), WorkerPool::new(4))
  }

  fn write_report(&self, rel: &str, records: &[(&str, DependencyKind)]) {
    let path = self.exec.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, encode(records)).unwrap();
  }

  /// Publish a report to the remote directory and return its digest and size.
  fn publish(&self, records: &[(&str, DependencyKind)]) -> (String, u64) {
    let bytes = encode(records);
    let sha = hash_bytes(&bytes);
    std::fs::write(self.remote.join(&sha), &bytes).unwrap();
    (sha, bytes.len() as u64)
  }
}

fn encode(records: &[(&str, DependencyKind)]) -> Vec<u8> {
  DepsReport::new(
    records
      .iter()
      .map(|(path, kind)| DependencyRecord::new(*path, *kind))
      .collect(),
  )
  .to_bytes()
}

fn target(label: &str, rel: &str) -> TargetInfo {
  TargetInfo::new(label, Some(ArtifactRef::local(rel)))
}

fn deps(result: &LoadResult, label: &str) -> Option<Vec<String>> {
  result.dependencies.get(&TargetKey::new(label)).map(<[String]>::to_vec)
}

async fn load_ok<R: ArtifactResolver, F: FetchService>(
  loader: &DepsLoader<R, F>,
  targets: &[TargetInfo],
  prior: Option<&DepsState>,
) -> LoadResult {
  match loader.load(targets, prior, &CancelToken::new()).await.unwrap() {
    LoadOutcome::Loaded(result) => result,
    LoadOutcome::Cancelled => panic!("load unexpectedly cancelled"),
  }
}

use DependencyKind::{Explicit, Implicit, Other, Unused};

#[tokio::test]
async fn filters_irrelevant_kinds_preserving_order() {
  let ws = Workspace::new();
  ws.write_report("bin/t2.jdeps", &[("x.jar", Explicit), ("y.jar", Other), ("z.jar", Implicit)]);

  let result = load_ok(&ws.loader(), &[target("//t:t2", "bin/t2.jdeps")], None).await;

  assert_eq!(deps(&result, "//t:t2"), Some(vec!["x.jar".to_string(), "z.jar".to_string()]));
  assert_eq!(result.summary.reports, 1);
}

#[tokio::test]
async fn unused_and_other_never_reach_state() {
  let ws = Workspace::new();
  ws.write_report(
    "bin/a.jdeps",
    &[("u.jar", Unused), ("o.jar", Other), ("e.jar", Explicit)],
  );

  let result = load_ok(&ws.loader(), &[target("//t:a", "bin/a.jdeps")], None).await;

  for entry in &result.state.entries {
    assert!(!entry.dependencies.iter().any(|d| d == "u.jar" || d == "o.jar"));
  }
}

#[tokio::test]
async fn second_identical_load_parses_nothing() {
  let ws = Workspace::new();
  ws.write_report("bin/a.jdeps", &[("a.jar", Explicit)]);
  ws.write_report("bin/b.jdeps", &[("b.jar", Implicit)]);
  let targets = vec![target("//t:a", "bin/a.jdeps"), target("//t:b", "bin/b.jdeps")];
  let loader = ws.loader();

  let first = load_ok(&loader, &targets, None).await;
  let second = load_ok(&loader, &targets, Some(&first.state)).await;

  assert_eq!(second.state, first.state);
  assert_eq!(second.summary.reports, 0);
  assert_eq!(second.summary.bytes_read, 0);
  assert_eq!(second.updated, 0);
  assert_eq!(second.unchanged, 2);
}

#[tokio::test]
async fn unchanged_fingerprint_keeps_prior_entry_without_reading() {
  let ws = Workspace::new();
  // The file on disk lists other paths; a matching fingerprint means it is never read.
  ws.write_report("bin/t1.jdeps", &[("other.jar", Explicit)]);
  let artifact = ws.resolver().resolve(&ArtifactRef::local("bin/t1.jdeps")).unwrap();
  let prior = DepsState::new(vec![Entry::new(
    TargetKey::new("//t:t1"),
    vec!["a.jar".to_string(), "b.jar".to_string()],
    artifact.state(),
  )]);

  let result = load_ok(&ws.loader(), &[target("//t:t1", "bin/t1.jdeps")], Some(&prior)).await;

  assert_eq!(deps(&result, "//t:t1"), Some(vec!["a.jar".to_string(), "b.jar".to_string()]));
  assert_eq!(result.summary.reports, 0);
}

#[tokio::test]
async fn changed_report_is_reparsed() {
  let ws = Workspace::new();
  ws.write_report("bin/a.jdeps", &[("old.jar", Explicit)]);
  let targets = vec![target("//t:a", "bin/a.jdeps")];
  let loader = ws.loader();
  let first = load_ok(&loader, &targets, None).await;

  ws.write_report("bin/a.jdeps", &[("new.jar", Explicit), ("newer.jar", Implicit)]);
  let second = load_ok(&loader, &targets, Some(&first.state)).await;

  assert_eq!(
    deps(&second, "//t:a"),
    Some(vec!["new.jar".to_string(), "newer.jar".to_string()])
  );
  assert_eq!(second.state.len(), 1);
  assert_eq!(second.updated, 1);
}

#[tokio::test]
async fn dropped_target_is_removed() {
  let ws = Workspace::new();
  ws.write_report("bin/t3.jdeps", &[("a.jar", Explicit)]);
  ws.write_report("bin/t4.jdeps", &[("b.jar", Explicit)]);
  let loader = ws.loader();
  let first = load_ok(
    &loader,
    &[target("//t:t3", "bin/t3.jdeps"), target("//t:t4", "bin/t4.jdeps")],
    None,
  )
  .await;

  let second = load_ok(&loader, &[target("//t:t4", "bin/t4.jdeps")], Some(&first.state)).await;

  assert!(deps(&second, "//t:t3").is_none());
  assert!(deps(&second, "//t:t4").is_some());
  assert_eq!(second.removed, 1);
  assert!(second.state.entries.iter().all(|e| e.target != TargetKey::new("//t:t3")));
}

#[tokio::test]
async fn target_moved_to_new_report_has_one_entry() {
  let ws = Workspace::new();
  ws.write_report("bin/old.jdeps", &[("old.jar", Explicit)]);
  ws.write_report("bin/new.jdeps", &[("new.jar", Explicit)]);
  let loader = ws.loader();
  let first = load_ok(&loader, &[target("//t:a", "bin/old.jdeps")], None).await;

  let second = load_ok(&loader, &[target("//t:a", "bin/new.jdeps")], Some(&first.state)).await;

  assert_eq!(second.state.len(), 1);
  assert_eq!(deps(&second, "//t:a"), Some(vec!["new.jar".to_string()]));
}

#[tokio::test]
async fn vanished_report_drops_target_data() {
  let ws = Workspace::new();
  ws.write_report("bin/a.jdeps", &[("a.jar", Explicit)]);
  ws.write_report("bin/b.jdeps", &[("b.jar", Explicit)]);
  let targets = vec![target("//t:a", "bin/a.jdeps"), target("//t:b", "bin/b.jdeps")];
  let loader = ws.loader();
  let first = load_ok(&loader, &targets, None).await;

  std::fs::remove_file(ws.exec.join("bin/a.jdeps")).unwrap();
  let second = load_ok(&loader, &targets, Some(&first.state)).await;

  assert!(deps(&second, "//t:a").is_none());
  assert_eq!(deps(&second, "//t:b"), Some(vec!["b.jar".to_string()]));
}

#[tokio::test]
async fn malformed_report_does_not_abort() {
  let ws = Workspace::new();
  std::fs::write(ws.exec.join("bad.jdeps"), [0x0a, 0xff, 0xff, 0xff]).unwrap();
  ws.write_report("good.jdeps", &[("g.jar", Explicit)]);

  let result = load_ok(
    &ws.loader(),
    &[target("//t:bad", "bad.jdeps"), target("//t:good", "good.jdeps")],
    None,
  )
  .await;

  assert!(deps(&result, "//t:bad").is_none());
  assert_eq!(deps(&result, "//t:good"), Some(vec!["g.jar".to_string()]));
  assert_eq!(result.summary.reports, 1);
}

struct FailingFetch;

impl FetchService for FailingFetch {
  async fn prefetch(&self, _artifacts: &[Artifact], _options: PrefetchOptions) -> Result<FetchStats, FetchError> {
    Err(FetchError::Failed("remote cache unavailable".to_string()))
  }
}

#[tokio::test]
async fn fetch_failure_leaves_stored_state_untouched() {
  let ws = Workspace::new();
  ws.write_report("bin/a.jdeps", &[("a.jar", Explicit)]);
  let store = StateStore::new(ws.data.clone());
  let first = load_ok(&ws.loader(), &[target("//t:a", "bin/a.jdeps")], None).await;
  store.save(&first.state).unwrap();

  ws.write_report("bin/a.jdeps", &[("changed.jar", Explicit)]);
  ws.write_report("bin/b.jdeps", &[("b.jar", Explicit)]);
  let prior = store.load().unwrap();
  let failing = DepsLoader::new(ws.resolver(), FailingFetch, WorkerPool::new(2));
  let result = failing
    .load(
      &[target("//t:a", "bin/a.jdeps"), target("//t:b", "bin/b.jdeps")],
      prior.as_ref(),
      &CancelToken::new(),
    )
    .await;

  assert!(matches!(result, Err(LoadError::FetchFailed(_))));
  assert_eq!(store.load().unwrap(), Some(first.state));
}

/// Cancels the shared token, then never completes.
struct CancellingFetch {
  cancel: CancelToken,
  calls: Arc<AtomicUsize>,
}

impl FetchService for CancellingFetch {
  async fn prefetch(&self, _artifacts: &[Artifact], _options: PrefetchOptions) -> Result<FetchStats, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.cancel.cancel();
    std::future::pending().await
  }
}

#[tokio::test]
async fn cancellation_during_fetch_yields_cancelled() {
  let ws = Workspace::new();
  ws.write_report("bin/a.jdeps", &[("a.jar", Explicit)]);
  let cancel = CancelToken::new();
  let calls = Arc::new(AtomicUsize::new(0));
  let loader = DepsLoader::new(
    ws.resolver(),
    CancellingFetch {
      cancel: cancel.clone(),
      calls: calls.clone(),
    },
    WorkerPool::new(1),
  );

  let outcome = loader
    .load(&[target("//t:a", "bin/a.jdeps")], None, &cancel)
    .await
    .unwrap();

  assert!(outcome.is_cancelled());
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn remote_reports_are_fetched_then_parsed() {
  let ws = Workspace::new();
  let (sha, size) = ws.publish(&[("r.jar", Explicit), ("skip.jar", Unused)]);
  let targets = vec![TargetInfo::new(
    "//t:remote",
    Some(ArtifactRef::remote("bin/remote.jdeps", sha.clone(), size)),
  )];
  let loader = DepsLoader::new(
    ws.resolver(),
    DirectoryFetchService::new(ws.remote.clone()).with_parallelism(2),
    WorkerPool::new(2),
  );

  let first = load_ok(&loader, &targets, None).await;
  assert_eq!(deps(&first, "//t:remote"), Some(vec!["r.jar".to_string()]));
  assert_eq!(first.fetch.fetched, 1);
  assert!(cached(&ws.cache, &sha).exists());

  let second = load_ok(&loader, &targets, Some(&first.state)).await;
  assert_eq!(second.fetch, FetchStats::default());
  assert_eq!(second.state, first.state);
}

fn cached(cache: &Path, sha: &str) -> PathBuf {
  deptrack_lib::artifact::resolve::cas_path(cache, sha)
}

#[tokio::test]
async fn state_survives_store_roundtrip() {
  let ws = Workspace::new();
  ws.write_report("bin/a.jdeps", &[("a.jar", Explicit)]);
  let targets = vec![target("//t:a", "bin/a.jdeps")];
  let store = StateStore::new(ws.data.clone());
  let loader = ws.loader();

  let first = load_ok(&loader, &targets, store.load().unwrap().as_ref()).await;
  store.save(&first.state).unwrap();
  let second = load_ok(&loader, &targets, store.load().unwrap().as_ref()).await;

  assert_eq!(second.summary.reports, 0);
  assert_eq!(second.state, first.state);
}
