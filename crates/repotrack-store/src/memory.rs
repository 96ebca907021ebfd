use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use repotrack_types::{
    AuditEntry, Owner, PackageKey, Repository, RepositoryEdit, RepositoryId, TrackingCommit,
};

use crate::error::{StoreError, StoreResult};
use crate::journal::{self, Journal, JournalConfig, JournalRecord};
use crate::state::{CatalogState, Mutation};
use crate::traits::RepositoryStore;

/// Snapshot-based repository store.
///
/// Readers clone an `Arc` of the current [`CatalogState`] and never block on
/// a writer. Writers are serialized by a mutex: each one copies the state,
/// applies its [`Mutation`], appends it to the journal (when configured),
/// and only then publishes the new snapshot.
pub struct MemoryStore {
    snapshot: RwLock<Arc<CatalogState>>,
    writer: Mutex<Option<Journal>>,
}

impl MemoryStore {
    /// Volatile store with no journal.
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(CatalogState::new())),
            writer: Mutex::new(None),
        }
    }

    /// Open a durable store, replaying the journal at `config.path`.
    pub fn open(config: &JournalConfig) -> StoreResult<Self> {
        let (journal, records) = Journal::open(config)?;
        let state = journal::replay(&records)?;
        info!(
            path = %config.path.display(),
            records = records.len(),
            repositories = state.len(),
            "store recovered"
        );
        Ok(Self {
            snapshot: RwLock::new(Arc::new(state)),
            writer: Mutex::new(Some(journal)),
        })
    }

    /// Current state. Cheap; later writes do not affect the returned value.
    pub fn snapshot(&self) -> StoreResult<Arc<CatalogState>> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| StoreError::LockPoisoned)
    }

    /// Rewrite the journal as a single snapshot. No-op for volatile stores.
    pub fn compact(&self) -> StoreResult<()> {
        let mut writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(journal) = writer.as_mut() {
            let state = self.snapshot()?;
            journal.compact(&state)?;
        }
        Ok(())
    }

    /// Size of the journal in bytes, if there is one.
    pub fn journal_len(&self) -> StoreResult<Option<u64>> {
        let writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(writer.as_ref().map(Journal::offset))
    }

    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.snapshot()?.is_empty())
    }

    fn mutate(&self, mutation: Mutation) -> StoreResult<()> {
        self.commit(mutation).map(drop)
    }

    /// Apply, journal and publish a mutation. Returns the published state.
    fn commit(&self, mutation: Mutation) -> StoreResult<Arc<CatalogState>> {
        let mut writer = self.writer.lock().map_err(|_| StoreError::LockPoisoned)?;

        let mut next = self.snapshot()?.as_ref().clone();
        next.apply(&mutation)?;

        let label = mutation.label();
        if let Some(journal) = writer.as_mut() {
            journal.append(&JournalRecord::Mutation(mutation))?;
        }

        let next = Arc::new(next);
        let mut slot = self.snapshot.write().map_err(|_| StoreError::LockPoisoned)?;
        *slot = Arc::clone(&next);
        debug!(mutation = label, "store mutation committed");
        Ok(next)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.snapshot().map(|s| s.len()).unwrap_or_default();
        let durable = self.writer.lock().map(|w| w.is_some()).unwrap_or_default();
        f.debug_struct("MemoryStore")
            .field("repositories", &count)
            .field("durable", &durable)
            .finish()
    }
}

impl RepositoryStore for MemoryStore {
    fn insert(&self, repository: Repository) -> StoreResult<()> {
        self.mutate(Mutation::Insert(repository))
    }

    fn get(&self, id: &RepositoryId) -> StoreResult<Option<Repository>> {
        Ok(self.snapshot()?.get(id).cloned())
    }

    fn get_by_name(&self, name: &str) -> StoreResult<Option<Repository>> {
        Ok(self.snapshot()?.get_by_name(name).cloned())
    }

    fn find_by_url(&self, url: &str) -> StoreResult<Option<Repository>> {
        Ok(self
            .snapshot()?
            .repositories()
            .into_iter()
            .find(|r| r.url == url)
            .cloned())
    }

    fn list(&self) -> StoreResult<Vec<Repository>> {
        Ok(self
            .snapshot()?
            .repositories()
            .into_iter()
            .cloned()
            .collect())
    }

    fn update_metadata(
        &self,
        id: &RepositoryId,
        expected_owner: Owner,
        edit: RepositoryEdit,
    ) -> StoreResult<Repository> {
        let state = self.commit(Mutation::UpdateMetadata {
            id: *id,
            expected_owner,
            edit,
        })?;
        state
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::RepositoryNotFound(id.to_string()))
    }

    fn delete(&self, id: &RepositoryId) -> StoreResult<Repository> {
        let existing = self
            .get(id)?
            .ok_or_else(|| StoreError::RepositoryNotFound(id.to_string()))?;
        self.mutate(Mutation::Delete(*id))?;
        Ok(existing)
    }

    fn set_verified_publisher(&self, id: &RepositoryId, verified: bool) -> StoreResult<()> {
        self.mutate(Mutation::SetVerifiedPublisher { id: *id, verified })
    }

    fn set_official(&self, id: &RepositoryId, official: bool) -> StoreResult<()> {
        self.mutate(Mutation::SetOfficial { id: *id, official })
    }

    fn set_tracking_result(
        &self,
        id: &RepositoryId,
        errors: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.mutate(Mutation::SetTrackingResult {
            id: *id,
            errors: errors.to_string(),
            at,
        })
    }

    fn set_digest(&self, id: &RepositoryId, digest: &str) -> StoreResult<()> {
        self.mutate(Mutation::SetDigest {
            id: *id,
            digest: digest.to_string(),
        })
    }

    fn commit_tracking(&self, id: &RepositoryId, commit: TrackingCommit) -> StoreResult<()> {
        self.mutate(Mutation::CommitTracking { id: *id, commit })
    }

    fn package_digests(&self, id: &RepositoryId) -> StoreResult<HashMap<PackageKey, String>> {
        Ok(self.snapshot()?.package_digests(id))
    }

    fn set_owner(&self, id: &RepositoryId, owner: Owner, audit: AuditEntry) -> StoreResult<()> {
        self.mutate(Mutation::SetOwner {
            id: *id,
            owner,
            audit,
        })
    }

    fn audit_log(&self, id: &RepositoryId) -> StoreResult<Vec<AuditEntry>> {
        Ok(self.snapshot()?.audit_log(id))
    }
}
