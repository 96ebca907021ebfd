use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use repotrack_catalog::Catalog;
use repotrack_digest::{combine, repository_changed, PackageDiff};
use repotrack_remote::{
    load_workspace_metadata, scan_layout, LayoutPackage, MetadataSource, RepositoryMetadata,
    Strategy,
};
use repotrack_types::{ErrorKind, Repository, TrackingCommit};

use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::ingest::{DiscoveredPackage, PackageIngester, PackageSource};
use crate::locks::RepositoryLocks;
use crate::report::{CycleReport, RepositoryOutcome, RepositoryReport};
use crate::workspace::Workspace;

/// Drives tracking cycles over the catalog.
///
/// Cheap to clone; clones share configuration and repository locks, so
/// overlapping runs from clones never work on the same repository.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    catalog: Catalog,
    ingester: Arc<dyn PackageIngester>,
    metadata: Option<Arc<dyn MetadataSource>>,
    config: TrackerConfig,
    locks: RepositoryLocks,
}

/// Everything a strategy produced for one repository.
struct Fetched {
    packages: Vec<DiscoveredPackage>,
    metadata: Option<RepositoryMetadata>,
    /// Repository digest to store when the remote reported none.
    fallback_digest: String,
    /// Non-fatal problems met while fetching.
    errors: Vec<String>,
    workspace: Option<Workspace>,
}

impl Tracker {
    /// `metadata` serves index-based kinds; cloned and exported workspaces
    /// carry their own metadata file.
    pub fn new(
        catalog: Catalog,
        ingester: Arc<dyn PackageIngester>,
        metadata: Option<Arc<dyn MetadataSource>>,
        config: TrackerConfig,
    ) -> TrackerResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(TrackerInner {
                catalog,
                ingester,
                metadata,
                config,
                locks: RepositoryLocks::new(),
            }),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub fn locks(&self) -> &RepositoryLocks {
        &self.inner.locks
    }

    /// Run one tracking cycle over every selected repository.
    ///
    /// Per-repository failures end up in the report and in the catalog;
    /// only failing to list the catalog is an error here.
    pub async fn run(&self, cancel: CancellationToken) -> TrackerResult<CycleReport> {
        let started_at = Utc::now();
        let all = self.inner.catalog.get_all(true)?;
        let live: HashSet<_> = all.iter().map(|r| r.id).collect();
        self.inner.locks.retain(|id| live.contains(id));

        let selected: Vec<Repository> = all
            .into_iter()
            .filter(|r| self.inner.config.selects(r))
            .collect();
        info!(
            repositories = selected.len(),
            workers = self.inner.config.workers,
            "tracking cycle started"
        );

        let semaphore = Arc::new(Semaphore::new(self.inner.config.workers));
        let mut join_set = JoinSet::new();
        let mut reports = Vec::with_capacity(selected.len());

        for repository in selected {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                reports.push(RepositoryReport::new(&repository, RepositoryOutcome::Cancelled));
                continue;
            };

            let tracker = self.clone();
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let _permit = permit;
                tracker.track(repository, cancel).await
            });
        }

        let mut worker_failures = 0;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    worker_failures += 1;
                    error!(error = %e, "tracking worker failed");
                }
            }
        }
        reports.sort_by(|a, b| a.name.cmp(&b.name));

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            repositories: reports,
            worker_failures,
        };
        info!(
            unchanged = report.count("unchanged"),
            synced = report.count("synced"),
            partial = report.count("partial"),
            failed = report.count("failed"),
            cancelled = report.count("cancelled"),
            busy = report.count("busy"),
            skipped = report.count("skipped"),
            worker_failures,
            "tracking cycle finished"
        );
        Ok(report)
    }

    async fn track(&self, listed: Repository, cancel: CancellationToken) -> RepositoryReport {
        let Some(_guard) = self.inner.locks.try_acquire(&listed.id) else {
            debug!(repository = %listed.name, "repository busy in another cycle");
            return RepositoryReport::new(&listed, RepositoryOutcome::Busy);
        };

        // The listing is as old as the cycle; work from the record as it is now.
        let repository = match self.inner.catalog.get_by_id(&listed.id, true) {
            Ok(current) if self.inner.config.selects(&current) => current,
            Ok(current) => {
                debug!(repository = %current.name, "repository no longer selected");
                return RepositoryReport::new(&current, RepositoryOutcome::Skipped);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(repository = %listed.name, "repository deleted since listing");
                return RepositoryReport::new(&listed, RepositoryOutcome::Skipped);
            }
            Err(e) => {
                warn!(repository = %listed.name, error = %e, "failed to reload repository");
                let error = e.to_string();
                return RepositoryReport::new(&listed, RepositoryOutcome::Failed { error });
            }
        };

        let outcome = self.track_locked(&repository, &cancel).await;
        RepositoryReport::new(&repository, outcome)
    }

    async fn track_locked(
        &self,
        repository: &Repository,
        cancel: &CancellationToken,
    ) -> RepositoryOutcome {
        if cancel.is_cancelled() {
            return RepositoryOutcome::Cancelled;
        }

        let timeout = self.inner.config.repository_timeout();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TrackerError::Cancelled),
            synced = tokio::time::timeout(timeout, self.sync(repository, cancel)) => {
                synced.unwrap_or_else(|_| Err(TrackerError::Timeout(timeout)))
            }
        };

        match result {
            Ok(outcome) => {
                info!(repository = %repository.name, %outcome, "repository tracked");
                outcome
            }
            Err(TrackerError::Cancelled) => {
                info!(repository = %repository.name, "repository tracking cancelled");
                RepositoryOutcome::Cancelled
            }
            Err(e) => {
                let message = e.to_string();
                warn!(repository = %repository.name, error = %message, "repository tracking failed");
                if let Err(record) = self
                    .inner
                    .catalog
                    .set_last_tracking_results(&repository.id, &message)
                {
                    error!(
                        repository = %repository.name,
                        error = %record,
                        "failed to record tracking failure"
                    );
                }
                RepositoryOutcome::Failed { error: message }
            }
        }
    }

    /// One repository's cycle. All catalog writes happen in the final
    /// `record_tracking` call.
    async fn sync(
        &self,
        repository: &Repository,
        cancel: &CancellationToken,
    ) -> TrackerResult<RepositoryOutcome> {
        let catalog = &self.inner.catalog;
        let strategy = catalog.strategies().get(repository.kind)?.clone();

        debug!(repository = %repository.name, "fetching remote digest");
        let remote_digest = strategy.remote_digest(repository).await?;

        // Packages left over by a partial cycle need another attempt even
        // though the digest already moved.
        let bypass = self.inner.config.bypass_digest_check || repository.retry_pending;
        if !bypass && !repository_changed(repository.digest.as_deref(), remote_digest.as_deref()) {
            let mut commit = TrackingCommit::result_only("", Utc::now());
            commit.source_url = Some(repository.url.clone());
            catalog.record_tracking(&repository.id, commit)?;
            return Ok(RepositoryOutcome::Unchanged);
        }

        debug!(
            repository = %repository.name,
            mode = ?strategy.mode(),
            bypass,
            "fetching remote content"
        );
        let Fetched {
            packages,
            metadata,
            fallback_digest,
            mut errors,
            workspace,
        } = self.fetch(&strategy, repository, cancel).await?;

        let (packages, ignored): (Vec<DiscoveredPackage>, Vec<DiscoveredPackage>) =
            packages.into_iter().partition(|p| {
                !metadata
                    .as_ref()
                    .is_some_and(|metadata| metadata.is_ignored(&p.key))
            });

        let stored = catalog.get_packages_digest(&repository.id)?;
        let diff = PackageDiff::compute(
            &stored,
            packages.iter().map(|p| (&p.key, p.digest.as_str())),
        );
        debug!(
            repository = %repository.name,
            changed = diff.changed.len(),
            unchanged = diff.unchanged.len(),
            removed = diff.removed.len(),
            ignored = ignored.len(),
            "package digests compared"
        );

        let mut commit = TrackingCommit::new(Utc::now());
        commit.source_url = Some(repository.url.clone());
        let mut failed = 0;

        for package in packages.iter().filter(|p| diff.is_changed(&p.key)) {
            if cancel.is_cancelled() {
                return Err(TrackerError::Cancelled);
            }
            match self.inner.ingester.ingest(repository, package).await {
                Ok(()) => {
                    commit
                        .upserted
                        .insert(package.key.clone(), package.digest.clone());
                }
                Err(e) => {
                    warn!(repository = %repository.name, package = %package.key, error = %e, "package ingestion failed");
                    failed += 1;
                    errors.push(format!("{}: {e}", package.key));
                }
            }
        }

        for key in &diff.removed {
            if cancel.is_cancelled() {
                return Err(TrackerError::Cancelled);
            }
            match self.inner.ingester.unregister(repository, key).await {
                Ok(()) => commit.removed.push(key.clone()),
                Err(e) => {
                    warn!(repository = %repository.name, package = %key, error = %e, "package removal failed");
                    failed += 1;
                    errors.push(format!("{key}: {e}"));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(TrackerError::Cancelled);
        }

        let ingested = commit.upserted.len();
        let removed = commit.removed.len();
        commit.digest = Some(remote_digest.unwrap_or(fallback_digest));
        commit.errors = errors.join("\n");
        commit.at = Utc::now();
        let clean = errors.is_empty();
        commit.partial = !clean;
        catalog.record_tracking(&repository.id, commit)?;
        if let Some(workspace) = workspace {
            workspace.dispose().await;
        }

        Ok(if clean {
            RepositoryOutcome::Synced {
                ingested,
                removed,
                unchanged: diff.unchanged.len(),
                ignored: ignored.len(),
            }
        } else {
            RepositoryOutcome::Partial {
                ingested,
                removed,
                failed,
            }
        })
    }

    async fn fetch(
        &self,
        strategy: &Strategy,
        repository: &Repository,
        cancel: &CancellationToken,
    ) -> TrackerResult<Fetched> {
        match strategy {
            Strategy::Index(loader) => {
                let index = loader.load_index(repository).await?;
                index.validate()?;
                let fallback_digest = index.digest()?;

                let mut errors = Vec::new();
                let metadata = match &self.inner.metadata {
                    Some(source) => match source.fetch(repository).await {
                        Ok(metadata) => metadata,
                        Err(e) => {
                            errors.push(format!("metadata: {e}"));
                            None
                        }
                    },
                    None => None,
                };

                let packages = index
                    .entries
                    .into_iter()
                    .map(|entry| DiscoveredPackage {
                        key: entry.key(),
                        digest: entry.digest,
                        source: PackageSource::Urls(entry.urls),
                    })
                    .collect();
                Ok(Fetched {
                    packages,
                    metadata,
                    fallback_digest,
                    errors,
                    workspace: None,
                })
            }
            Strategy::Clone(cloner) => {
                let (path, resolved_ref) = cloner.clone_repository(cancel, repository).await?;
                let (workspace, (layout, metadata, errors)) =
                    inspect_workspace(Workspace::new(path)).await?;
                Ok(Fetched {
                    packages: layout.into_iter().map(discovered).collect(),
                    metadata,
                    fallback_digest: resolved_ref,
                    errors,
                    workspace: Some(workspace),
                })
            }
            Strategy::Export(exporter) => {
                let path = exporter.export_repository(cancel, repository).await?;
                let (workspace, (layout, metadata, errors)) =
                    inspect_workspace(Workspace::new(path)).await?;
                let fallback_digest = combine(layout.iter().map(|p| p.digest.as_str()));
                Ok(Fetched {
                    packages: layout.into_iter().map(discovered).collect(),
                    metadata,
                    fallback_digest,
                    errors,
                    workspace: Some(workspace),
                })
            }
        }
    }
}

fn discovered(package: LayoutPackage) -> DiscoveredPackage {
    DiscoveredPackage {
        key: package.key,
        digest: package.digest,
        source: PackageSource::Directory(package.path),
    }
}

type Inspected = (Vec<LayoutPackage>, Option<RepositoryMetadata>, Vec<String>);

/// Scan a workspace and read its metadata file off the async runtime.
///
/// The workspace travels with the scan, so a cycle abandoned mid-scan only
/// removes the directory once the scan is done with it.
async fn inspect_workspace(workspace: Workspace) -> TrackerResult<(Workspace, Inspected)> {
    tokio::task::spawn_blocking(move || -> TrackerResult<(Workspace, Inspected)> {
        let root = workspace.path();
        let layout = scan_layout(root)?;
        let mut errors = Vec::new();
        let metadata = match load_workspace_metadata(root) {
            Ok(metadata) => metadata,
            Err(e) => {
                errors.push(format!("metadata: {e}"));
                None
            }
        };
        Ok((workspace, (layout, metadata, errors)))
    })
    .await
    .map_err(|e| TrackerError::Worker(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use repotrack_remote::{
        Cloner, Exporter, IndexDocument, IndexEntry, IndexLoader, RemoteError, RemoteResult,
        StrategyRegistry, METADATA_FILE,
    };
    use repotrack_store::{InMemoryDirectory, MemoryStore, RepositoryStore};
    use repotrack_types::{
        Owner, PackageKey, RepositoryDraft, RepositoryEdit, RepositoryId, RepositoryKind, UserId,
    };

    use crate::error::IngestError;

    // ---- Doubles ----

    /// Index loader serving a fixed digest and document per repository name.
    #[derive(Default)]
    struct FakeIndex {
        digests: Mutex<HashMap<String, RemoteResult<Option<String>>>>,
        documents: Mutex<HashMap<String, Vec<IndexEntry>>>,
        loads: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Option<Duration>,
        started: Notify,
    }

    impl FakeIndex {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn serve(&self, name: &str, digest: Option<&str>, entries: Vec<IndexEntry>) {
            self.digests
                .lock()
                .unwrap()
                .insert(name.into(), Ok(digest.map(str::to_string)));
            self.documents.lock().unwrap().insert(name.into(), entries);
        }

        fn go_offline(&self, name: &str) {
            self.digests.lock().unwrap().insert(
                name.into(),
                Err(RemoteError::Unavailable("connection refused".into())),
            );
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IndexLoader for FakeIndex {
        async fn remote_digest(&self, repository: &Repository) -> RemoteResult<Option<String>> {
            match self.digests.lock().unwrap().get(&repository.name) {
                Some(Ok(digest)) => Ok(digest.clone()),
                Some(Err(e)) => Err(RemoteError::Unavailable(e.to_string())),
                None => Err(RemoteError::Unavailable("unknown repository".into())),
            }
        }

        async fn load_index(&self, repository: &Repository) -> RemoteResult<IndexDocument> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.started.notify_one();
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let entries = self
                .documents
                .lock()
                .unwrap()
                .get(&repository.name)
                .cloned()
                .ok_or_else(|| RemoteError::Unavailable("index missing".into()))?;
            IndexDocument::new(entries)
        }
    }

    /// Cloner that materializes a workspace from a file list.
    struct FakeCloner {
        root: PathBuf,
        files: Vec<(&'static str, &'static str)>,
        resolved_ref: &'static str,
        workspaces: Mutex<Vec<PathBuf>>,
    }

    impl FakeCloner {
        fn materialize(&self, repository: &Repository) -> PathBuf {
            let path = self.root.join(repository.id.to_string());
            for (rel, contents) in &self.files {
                let file = path.join(rel);
                fs::create_dir_all(file.parent().unwrap()).unwrap();
                fs::write(file, contents).unwrap();
            }
            self.workspaces.lock().unwrap().push(path.clone());
            path
        }
    }

    #[async_trait]
    impl Cloner for FakeCloner {
        async fn remote_digest(&self, _: &Repository) -> RemoteResult<Option<String>> {
            Ok(None)
        }

        async fn clone_repository(
            &self,
            _: &CancellationToken,
            repository: &Repository,
        ) -> RemoteResult<(PathBuf, String)> {
            Ok((self.materialize(repository), self.resolved_ref.to_string()))
        }
    }

    #[async_trait]
    impl Exporter for FakeCloner {
        async fn remote_digest(&self, _: &Repository) -> RemoteResult<Option<String>> {
            Ok(None)
        }

        async fn export_repository(
            &self,
            _: &CancellationToken,
            repository: &Repository,
        ) -> RemoteResult<PathBuf> {
            Ok(self.materialize(repository))
        }
    }

    /// Records ingested and removed keys; fails for listed package names.
    #[derive(Default)]
    struct RecordingIngester {
        ingested: Mutex<Vec<PackageKey>>,
        removed: Mutex<Vec<PackageKey>>,
        failing: Mutex<HashSet<String>>,
    }

    impl RecordingIngester {
        fn fail_on(&self, name: &str) {
            self.failing.lock().unwrap().insert(name.into());
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }

        fn ingested(&self) -> Vec<String> {
            self.ingested.lock().unwrap().iter().map(|k| k.to_string()).collect()
        }

        fn removed(&self) -> Vec<String> {
            self.removed.lock().unwrap().iter().map(|k| k.to_string()).collect()
        }

        fn reset(&self) {
            self.ingested.lock().unwrap().clear();
            self.removed.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl PackageIngester for RecordingIngester {
        async fn ingest(
            &self,
            _: &Repository,
            package: &DiscoveredPackage,
        ) -> Result<(), IngestError> {
            if self.failing.lock().unwrap().contains(&package.key.name) {
                return Err(IngestError::new("invalid chart archive"));
            }
            if let PackageSource::Directory(path) = &package.source {
                assert!(path.is_dir(), "workspace must outlive ingestion");
            }
            self.ingested.lock().unwrap().push(package.key.clone());
            Ok(())
        }

        async fn unregister(&self, _: &Repository, key: &PackageKey) -> Result<(), IngestError> {
            self.removed.lock().unwrap().push(key.clone());
            Ok(())
        }
    }

    // ---- Fixture ----

    struct Fixture {
        store: Arc<MemoryStore>,
        index: Arc<FakeIndex>,
        ingester: Arc<RecordingIngester>,
        tracker: Tracker,
    }

    fn fixture(config: TrackerConfig) -> Fixture {
        fixture_with(config, FakeIndex::default(), |_| {})
    }

    fn fixture_with(
        config: TrackerConfig,
        index: FakeIndex,
        register: impl FnOnce(&mut StrategyRegistry),
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let index = Arc::new(index);
        let ingester = Arc::new(RecordingIngester::default());

        let mut strategies = StrategyRegistry::new();
        strategies.register_index_loader(index.clone());
        register(&mut strategies);

        let catalog = Catalog::new(
            store.clone(),
            Arc::new(InMemoryDirectory::new()),
            Arc::new(strategies),
        );
        let tracker = Tracker::new(catalog, ingester.clone(), None, config).unwrap();
        Fixture {
            store,
            index,
            ingester,
            tracker,
        }
    }

    fn insert(store: &MemoryStore, name: &str, kind: RepositoryKind, digest: Option<&str>) -> RepositoryId {
        let mut repository = Repository::from_draft(
            RepositoryDraft::new(name, "https://charts.example.org", kind),
            Owner::User(UserId::new()),
        );
        repository.digest = digest.map(str::to_string);
        let id = repository.id;
        store.insert(repository).unwrap();
        id
    }

    fn seed_packages(store: &MemoryStore, id: &RepositoryId, packages: &[(&str, &str, &str)]) {
        let mut commit = TrackingCommit::new(Utc::now());
        for (name, version, digest) in packages {
            commit
                .upserted
                .insert(PackageKey::new(*name, *version), digest.to_string());
        }
        let digest = store.get(id).unwrap().unwrap().digest;
        commit.digest = digest;
        store.commit_tracking(id, commit).unwrap();
    }

    fn stored(store: &MemoryStore, id: &RepositoryId) -> Repository {
        store.get(id).unwrap().unwrap()
    }

    fn edit(store: &MemoryStore, id: &RepositoryId, change: impl FnOnce(&mut RepositoryEdit)) {
        let current = stored(store, id);
        let mut edit = RepositoryEdit::from_record(&current);
        change(&mut edit);
        store.update_metadata(id, current.owner, edit).unwrap();
    }

    // ---- Test 1: digest pre-check ----

    #[tokio::test]
    async fn unchanged_remote_skips_fetch_and_advances_timestamp() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        f.index.serve("acme/charts", Some("abc"), vec![]);

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.get("acme/charts"), Some(&RepositoryOutcome::Unchanged));
        assert_eq!(f.index.loads(), 0);
        assert!(f.ingester.ingested().is_empty());
        let repo = stored(&f.store, &id);
        assert!(repo.last_tracking_ts.is_some());
        assert_eq!(repo.last_tracking_errors.as_deref(), Some(""));
        assert_eq!(repo.digest.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn bypass_flag_forces_fetch() {
        let f = fixture(TrackerConfig {
            bypass_digest_check: true,
            ..TrackerConfig::default()
        });
        insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        f.index.serve("acme/charts", Some("abc"), vec![IndexEntry::new("chart-a", "1.0", "da")]);

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();
        assert_eq!(f.index.loads(), 1);
        assert!(matches!(
            report.get("acme/charts"),
            Some(RepositoryOutcome::Synced { ingested: 1, .. })
        ));
    }

    // ---- Test 2: package-level diff ----

    #[tokio::test]
    async fn only_changed_packages_are_ingested() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        seed_packages(&f.store, &id, &[("chart-b", "2.0", "digestB")]);
        f.index.serve(
            "acme/charts",
            Some("xyz"),
            vec![
                IndexEntry::new("chart-a", "1.0", "digestA"),
                IndexEntry::new("chart-b", "2.0", "digestB"),
            ],
        );

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();

        assert_eq!(f.ingester.ingested(), vec!["chart-a@1.0"]);
        assert_eq!(
            report.get("acme/charts"),
            Some(&RepositoryOutcome::Synced {
                ingested: 1,
                removed: 0,
                unchanged: 1,
                ignored: 0
            })
        );
        let repo = stored(&f.store, &id);
        assert_eq!(repo.digest.as_deref(), Some("xyz"));
        assert!(repo.is_healthy());
        assert_eq!(f.store.package_digests(&id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn vanished_packages_are_unregistered() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        seed_packages(&f.store, &id, &[("chart-a", "1.0", "da"), ("old", "0.1", "do")]);
        f.index.serve("acme/charts", Some("xyz"), vec![IndexEntry::new("chart-a", "1.0", "da")]);

        f.tracker.run(CancellationToken::new()).await.unwrap();

        assert_eq!(f.ingester.removed(), vec!["old@0.1"]);
        let digests = f.store.package_digests(&id).unwrap();
        assert_eq!(digests.len(), 1);
        assert!(digests.contains_key(&PackageKey::new("chart-a", "1.0")));
    }

    // ---- Test 3: total failures ----

    #[tokio::test]
    async fn unreachable_remote_keeps_digest_and_records_error() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        f.index.go_offline("acme/charts");

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();

        assert!(matches!(report.get("acme/charts"), Some(RepositoryOutcome::Failed { .. })));
        let repo = stored(&f.store, &id);
        assert_eq!(repo.digest.as_deref(), Some("abc"));
        assert!(!repo.last_tracking_errors.unwrap_or_default().is_empty());
        assert!(repo.last_tracking_ts.is_some());
    }

    #[tokio::test]
    async fn total_failure_does_not_force_refetch() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        f.index.go_offline("acme/charts");
        f.tracker.run(CancellationToken::new()).await.unwrap();
        assert!(!stored(&f.store, &id).is_healthy());

        // Back online with the digest already stored: nothing to fetch.
        f.index.serve("acme/charts", Some("abc"), vec![IndexEntry::new("chart-a", "1.0", "da")]);
        let report = f.tracker.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report.get("acme/charts"), Some(&RepositoryOutcome::Unchanged));
        assert_eq!(f.index.loads(), 0);
        assert!(stored(&f.store, &id).is_healthy());
    }

    #[tokio::test]
    async fn failed_index_load_keeps_digest() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        f.index.serve("acme/charts", Some("xyz"), vec![]);
        f.index.documents.lock().unwrap().clear();

        f.tracker.run(CancellationToken::new()).await.unwrap();

        let repo = stored(&f.store, &id);
        assert_eq!(repo.digest.as_deref(), Some("abc"));
        assert!(repo
            .last_tracking_errors
            .unwrap()
            .contains("index missing"));
    }

    #[tokio::test]
    async fn kind_without_strategy_fails_in_isolation() {
        let f = fixture(TrackerConfig::default());
        insert(&f.store, "acme/rules", RepositoryKind::Falco, None);
        let ok = insert(&f.store, "acme/charts", RepositoryKind::Helm, None);
        f.index.serve("acme/charts", Some("xyz"), vec![IndexEntry::new("chart-a", "1.0", "da")]);

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();

        assert!(matches!(report.get("acme/rules"), Some(RepositoryOutcome::Failed { .. })));
        assert!(matches!(report.get("acme/charts"), Some(RepositoryOutcome::Synced { .. })));
        assert_eq!(stored(&f.store, &ok).digest.as_deref(), Some("xyz"));
        assert!(!report.is_clean());
    }

    // ---- Test 4: partial failures ----

    #[tokio::test]
    async fn partial_failure_moves_digest_and_retries_failed_package() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, None);
        f.index.serve(
            "acme/charts",
            Some("xyz"),
            vec![
                IndexEntry::new("chart-a", "1.0", "da"),
                IndexEntry::new("chart-b", "2.0", "db"),
            ],
        );
        f.ingester.fail_on("chart-b");

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();
        assert_eq!(
            report.get("acme/charts"),
            Some(&RepositoryOutcome::Partial {
                ingested: 1,
                removed: 0,
                failed: 1
            })
        );
        let repo = stored(&f.store, &id);
        assert_eq!(repo.digest.as_deref(), Some("xyz"));
        assert!(repo.last_tracking_errors.as_deref().unwrap().contains("chart-b@2.0"));
        assert!(!f
            .store
            .package_digests(&id)
            .unwrap()
            .contains_key(&PackageKey::new("chart-b", "2.0")));

        // Same remote digest, but the previous errors force another pass
        // that only touches the failed package.
        f.ingester.heal();
        f.ingester.reset();
        let report = f.tracker.run(CancellationToken::new()).await.unwrap();
        assert_eq!(f.ingester.ingested(), vec!["chart-b@2.0"]);
        assert!(matches!(report.get("acme/charts"), Some(RepositoryOutcome::Synced { .. })));
        assert!(stored(&f.store, &id).is_healthy());

        // Healthy again: the pre-check short-circuits.
        let report = f.tracker.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report.get("acme/charts"), Some(&RepositoryOutcome::Unchanged));
        assert_eq!(f.index.loads(), 2);
    }

    #[tokio::test]
    async fn pending_retry_survives_an_unreachable_cycle() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, None);
        let entries = vec![
            IndexEntry::new("chart-a", "1.0", "da"),
            IndexEntry::new("chart-b", "2.0", "db"),
        ];
        f.index.serve("acme/charts", Some("xyz"), entries.clone());
        f.ingester.fail_on("chart-b");
        f.tracker.run(CancellationToken::new()).await.unwrap();
        assert!(stored(&f.store, &id).retry_pending);

        f.index.go_offline("acme/charts");
        f.tracker.run(CancellationToken::new()).await.unwrap();
        assert!(stored(&f.store, &id).retry_pending);

        f.index.serve("acme/charts", Some("xyz"), entries);
        f.ingester.heal();
        f.ingester.reset();
        f.tracker.run(CancellationToken::new()).await.unwrap();
        assert_eq!(f.ingester.ingested(), vec!["chart-b@2.0"]);
        assert!(!stored(&f.store, &id).retry_pending);
    }

    // ---- Test 5: clone and export strategies ----

    #[tokio::test]
    async fn cloned_workspace_is_scanned_filtered_and_removed() {
        let root = tempfile::tempdir().unwrap();
        let cloner = Arc::new(FakeCloner {
            root: root.path().to_path_buf(),
            files: vec![
                ("redis/1.0.0/rules.yaml", "a: 1"),
                ("redis/1.1.0/rules.yaml", "a: 2"),
                ("legacy/0.1.0/rules.yaml", "x"),
                (METADATA_FILE, "ignore:\n  - name: legacy\n"),
            ],
            resolved_ref: "3f2a9c1",
            workspaces: Mutex::new(Vec::new()),
        });
        let registered = cloner.clone();
        let f = fixture_with(TrackerConfig::default(), FakeIndex::default(), move |r| {
            r.register_cloner(registered);
        });
        let id = insert(&f.store, "acme/rules", RepositoryKind::Falco, None);

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();

        assert_eq!(
            report.get("acme/rules"),
            Some(&RepositoryOutcome::Synced {
                ingested: 2,
                removed: 0,
                unchanged: 0,
                ignored: 1
            })
        );
        assert_eq!(f.ingester.ingested(), vec!["redis@1.0.0", "redis@1.1.0"]);
        assert_eq!(stored(&f.store, &id).digest.as_deref(), Some("3f2a9c1"));
        for workspace in cloner.workspaces.lock().unwrap().iter() {
            assert!(!workspace.exists());
        }
    }

    #[tokio::test]
    async fn exported_repository_digest_combines_packages() {
        let root = tempfile::tempdir().unwrap();
        let exporter = Arc::new(FakeCloner {
            root: root.path().to_path_buf(),
            files: vec![("operator/0.9.0/manifest.yaml", "kind: CSV")],
            resolved_ref: "",
            workspaces: Mutex::new(Vec::new()),
        });
        let registered = exporter.clone();
        let f = fixture_with(TrackerConfig::default(), FakeIndex::default(), move |r| {
            r.register_exporter(registered);
        });
        let id = insert(&f.store, "acme/operators", RepositoryKind::Olm, None);

        f.tracker.run(CancellationToken::new()).await.unwrap();

        let digests = f.store.package_digests(&id).unwrap();
        let expected = combine(digests.values().map(String::as_str));
        assert_eq!(stored(&f.store, &id).digest, Some(expected));
        assert!(exporter.workspaces.lock().unwrap().iter().all(|w| !w.exists()));
    }

    // ---- Test 6: selection ----

    #[tokio::test]
    async fn disabled_and_filtered_repositories_are_skipped() {
        let f = fixture(TrackerConfig {
            kinds: vec![RepositoryKind::Helm],
            ..TrackerConfig::default()
        });
        let disabled = insert(&f.store, "off", RepositoryKind::Helm, Some("abc"));
        edit(&f.store, &disabled, |e| e.disabled = true);
        insert(&f.store, "rules", RepositoryKind::Falco, None);
        insert(&f.store, "on", RepositoryKind::Helm, Some("abc"));
        f.index.serve("on", Some("abc"), vec![]);

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();
        let names: Vec<&str> = report.repositories.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["on"]);
    }

    #[tokio::test]
    async fn records_changed_after_listing_are_reloaded() {
        let f = fixture_with(
            TrackerConfig {
                workers: 1,
                ..TrackerConfig::default()
            },
            FakeIndex::with_delay(Duration::from_millis(200)),
            |_| {},
        );
        for name in ["a", "b", "c", "d"] {
            f.index.serve(name, Some("xyz"), vec![IndexEntry::new("chart", "1.0", "dc")]);
        }
        insert(&f.store, "a", RepositoryKind::Helm, None);
        let moved = insert(&f.store, "b", RepositoryKind::Helm, Some("abc"));
        let disabled = insert(&f.store, "c", RepositoryKind::Helm, None);
        let deleted = insert(&f.store, "d", RepositoryKind::Helm, None);

        let tracker = f.tracker.clone();
        let run = tokio::spawn(async move { tracker.run(CancellationToken::new()).await });
        // "a" holds the only worker; the rest are listed but not started.
        f.index.started.notified().await;
        edit(&f.store, &moved, |e| e.url = "https://mirror.example.org".into());
        edit(&f.store, &disabled, |e| e.disabled = true);
        f.store.delete(&deleted).unwrap();
        let report = run.await.unwrap().unwrap();

        assert!(matches!(report.get("b"), Some(RepositoryOutcome::Synced { .. })));
        let b = stored(&f.store, &moved);
        assert_eq!(b.url, "https://mirror.example.org");
        assert_eq!(b.digest.as_deref(), Some("xyz"));

        assert_eq!(report.get("c"), Some(&RepositoryOutcome::Skipped));
        assert!(stored(&f.store, &disabled).last_tracking_ts.is_none());
        assert_eq!(report.get("d"), Some(&RepositoryOutcome::Skipped));
        assert!(f.store.get(&deleted).unwrap().is_none());
        assert_eq!(f.index.loads(), 2);
    }

    // ---- Test 7: locking ----

    #[tokio::test]
    async fn held_repository_is_busy_and_untouched() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        f.index.serve("acme/charts", Some("xyz"), vec![IndexEntry::new("chart-a", "1.0", "da")]);

        let guard = f.tracker.locks().try_acquire(&id).unwrap();
        let report = f.tracker.run(CancellationToken::new()).await.unwrap();
        assert_eq!(report.get("acme/charts"), Some(&RepositoryOutcome::Busy));
        assert!(stored(&f.store, &id).last_tracking_ts.is_none());

        drop(guard);
        let report = f.tracker.run(CancellationToken::new()).await.unwrap();
        assert!(matches!(report.get("acme/charts"), Some(RepositoryOutcome::Synced { .. })));
    }

    #[tokio::test]
    async fn overlapping_runs_never_share_a_repository() {
        let f = fixture_with(
            TrackerConfig::default(),
            FakeIndex::with_delay(Duration::from_millis(50)),
            |_| {},
        );
        insert(&f.store, "acme/charts", RepositoryKind::Helm, None);
        f.index.serve("acme/charts", Some("xyz"), vec![IndexEntry::new("chart-a", "1.0", "da")]);

        let other = f.tracker.clone();
        let (first, second) = tokio::join!(
            f.tracker.run(CancellationToken::new()),
            other.run(CancellationToken::new())
        );
        let outcomes = [
            first.unwrap().get("acme/charts").cloned().unwrap(),
            second.unwrap().get("acme/charts").cloned().unwrap(),
        ];
        assert_eq!(outcomes.iter().filter(|o| **o == RepositoryOutcome::Busy).count(), 1);
        assert_eq!(f.index.loads(), 1);
    }

    // ---- Test 8: bounded pool ----

    #[tokio::test]
    async fn worker_pool_is_bounded() {
        let f = fixture_with(
            TrackerConfig {
                workers: 2,
                ..TrackerConfig::default()
            },
            FakeIndex::with_delay(Duration::from_millis(20)),
            |_| {},
        );
        for i in 0..6 {
            let name = format!("repo-{i}");
            insert(&f.store, &name, RepositoryKind::Helm, None);
            f.index.serve(&name, Some("d"), vec![IndexEntry::new("chart", "1.0", "dc")]);
        }

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.count("synced"), 6);
        assert!(f.index.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(f.index.loads(), 6);
    }

    // ---- Test 9: cancellation and timeouts ----

    #[tokio::test]
    async fn cancelled_before_start_writes_nothing() {
        let f = fixture(TrackerConfig::default());
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        f.index.serve("acme/charts", Some("xyz"), vec![]);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = f.tracker.run(cancel).await.unwrap();

        assert_eq!(report.get("acme/charts"), Some(&RepositoryOutcome::Cancelled));
        let repo = stored(&f.store, &id);
        assert!(repo.last_tracking_ts.is_none());
        assert_eq!(repo.digest.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn cancellation_mid_fetch_writes_nothing() {
        let f = fixture_with(
            TrackerConfig::default(),
            FakeIndex::with_delay(Duration::from_secs(3600)),
            |_| {},
        );
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        f.index.serve("acme/charts", Some("xyz"), vec![IndexEntry::new("chart-a", "1.0", "da")]);

        let cancel = CancellationToken::new();
        let tracker = f.tracker.clone();
        let run = tokio::spawn({
            let cancel = cancel.clone();
            async move { tracker.run(cancel).await }
        });
        f.index.started.notified().await;
        cancel.cancel();
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.get("acme/charts"), Some(&RepositoryOutcome::Cancelled));
        let repo = stored(&f.store, &id);
        assert!(repo.last_tracking_ts.is_none());
        assert_eq!(repo.digest.as_deref(), Some("abc"));
        assert!(f.store.package_digests(&id).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_total_failure() {
        let f = fixture_with(
            TrackerConfig {
                repository_timeout_secs: 5,
                ..TrackerConfig::default()
            },
            FakeIndex::with_delay(Duration::from_secs(3600)),
            |_| {},
        );
        let id = insert(&f.store, "acme/charts", RepositoryKind::Helm, Some("abc"));
        f.index.serve("acme/charts", Some("xyz"), vec![]);

        let report = f.tracker.run(CancellationToken::new()).await.unwrap();

        match report.get("acme/charts") {
            Some(RepositoryOutcome::Failed { error }) => assert!(error.contains("timed out")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        let repo = stored(&f.store, &id);
        assert_eq!(repo.digest.as_deref(), Some("abc"));
        assert!(!repo.is_healthy());
    }

    #[test]
    fn rejects_invalid_config() {
        let catalog = Catalog::new(
            Arc::new(MemoryStore::new()),
            Arc::new(InMemoryDirectory::new()),
            Arc::new(StrategyRegistry::new()),
        );
        let result = Tracker::new(
            catalog,
            Arc::new(RecordingIngester::default()),
            None,
            TrackerConfig {
                workers: 0,
                ..TrackerConfig::default()
            },
        );
        assert!(matches!(result, Err(TrackerError::InvalidConfig(_))));
    }
}
