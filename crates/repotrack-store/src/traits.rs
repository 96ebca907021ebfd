use std::collections::HashMap;

use chrono::{DateTime, Utc};

use repotrack_types::{
    AuditEntry, Owner, PackageKey, Repository, RepositoryEdit, RepositoryId, RepositoryKind,
    TrackingCommit,
};

use crate::error::StoreResult;

/// Durable home of repository records and their package digests.
///
/// All implementations must satisfy these invariants:
/// - Repository names are unique; `insert` and `update_metadata` fail with
///   `NameTaken` rather than shadow another record.
/// - A mutation is either fully visible to later reads or not at all.
/// - Deleting a repository deletes its package digests.
/// - An owner change clears `verified_publisher` and records an audit
///   entry in the same step.
/// - Missing repositories are reported as `RepositoryNotFound`, never
///   silently ignored.
pub trait RepositoryStore: Send + Sync {
    /// Insert a new repository.
    fn insert(&self, repository: Repository) -> StoreResult<()>;

    /// Returns `Ok(None)` if the repository does not exist.
    fn get(&self, id: &RepositoryId) -> StoreResult<Option<Repository>>;

    fn get_by_name(&self, name: &str) -> StoreResult<Option<Repository>>;

    /// First repository registered with exactly this URL, if any.
    fn find_by_url(&self, url: &str) -> StoreResult<Option<Repository>>;

    /// Every repository, sorted by name.
    fn list(&self) -> StoreResult<Vec<Repository>>;

    /// Merge caller-editable fields into the stored record and return the
    /// result. Fails with `OwnerChanged` if the owner is no longer
    /// `expected_owner`. Other fields keep their stored values.
    fn update_metadata(
        &self,
        id: &RepositoryId,
        expected_owner: Owner,
        edit: RepositoryEdit,
    ) -> StoreResult<Repository>;

    /// Remove a repository and its package digests. Returns the removed record.
    fn delete(&self, id: &RepositoryId) -> StoreResult<Repository>;

    fn set_verified_publisher(&self, id: &RepositoryId, verified: bool) -> StoreResult<()>;

    fn set_official(&self, id: &RepositoryId, official: bool) -> StoreResult<()>;

    /// Record the outcome of a tracking attempt without touching digests.
    fn set_tracking_result(
        &self,
        id: &RepositoryId,
        errors: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    fn set_digest(&self, id: &RepositoryId, digest: &str) -> StoreResult<()>;

    /// Apply everything a tracking run produced as one atomic step.
    fn commit_tracking(&self, id: &RepositoryId, commit: TrackingCommit) -> StoreResult<()>;

    /// Stored digest per package. Empty for unknown repositories.
    fn package_digests(&self, id: &RepositoryId) -> StoreResult<HashMap<PackageKey, String>>;

    /// Move a repository to a new owner.
    fn set_owner(&self, id: &RepositoryId, owner: Owner, audit: AuditEntry) -> StoreResult<()>;

    /// Ownership changes for a repository, oldest first.
    fn audit_log(&self, id: &RepositoryId) -> StoreResult<Vec<AuditEntry>>;

    /// Default implementation filters [`list`](Self::list).
    fn list_by_kind(&self, kind: RepositoryKind) -> StoreResult<Vec<Repository>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.kind == kind)
            .collect())
    }

    /// Default implementation filters [`list`](Self::list).
    fn list_by_owner(&self, owner: &Owner) -> StoreResult<Vec<Repository>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.owner == *owner)
            .collect())
    }
}
