//! The catalog state and the mutations that move it forward.
//!
//! [`CatalogState::apply`] is the single place where invariants are
//! enforced. The live store and journal replay both go through it, so a
//! recovered store always matches what was acknowledged before the crash.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repotrack_types::{
    AuditEntry, Owner, PackageKey, Repository, RepositoryEdit, RepositoryId, TrackingCommit,
};

use crate::error::{StoreError, StoreResult};

/// A single change to the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    Insert(Repository),
    /// Merge caller-editable fields into the current record. Fails if the
    /// owner is no longer `expected_owner`.
    UpdateMetadata {
        id: RepositoryId,
        expected_owner: Owner,
        edit: RepositoryEdit,
    },
    Delete(RepositoryId),
    SetVerifiedPublisher {
        id: RepositoryId,
        verified: bool,
    },
    SetOfficial {
        id: RepositoryId,
        official: bool,
    },
    SetTrackingResult {
        id: RepositoryId,
        errors: String,
        at: DateTime<Utc>,
    },
    SetDigest {
        id: RepositoryId,
        digest: String,
    },
    CommitTracking {
        id: RepositoryId,
        commit: TrackingCommit,
    },
    /// Ownership change. Clears the verified-publisher flag in the same step.
    /// Fails if the current owner is no longer `audit.previous_owner`.
    SetOwner {
        id: RepositoryId,
        owner: Owner,
        audit: AuditEntry,
    },
}

impl Mutation {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::UpdateMetadata { .. } => "update-metadata",
            Self::Delete(_) => "delete",
            Self::SetVerifiedPublisher { .. } => "set-verified-publisher",
            Self::SetOfficial { .. } => "set-official",
            Self::SetTrackingResult { .. } => "set-tracking-result",
            Self::SetDigest { .. } => "set-digest",
            Self::CommitTracking { .. } => "commit-tracking",
            Self::SetOwner { .. } => "set-owner",
        }
    }
}

type PackageDigests = HashMap<PackageKey, String>;

/// Complete catalog contents.
///
/// Values are reference counted so cloning the state for a copy-on-write
/// update only copies the maps, not the records.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogState {
    repositories: HashMap<RepositoryId, Arc<Repository>>,
    names: HashMap<String, RepositoryId>,
    packages: HashMap<RepositoryId, Arc<PackageDigests>>,
    audit: Vec<AuditEntry>,
}

impl CatalogState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn get(&self, id: &RepositoryId) -> Option<&Repository> {
        self.repositories.get(id).map(Arc::as_ref)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Repository> {
        self.names.get(name).and_then(|id| self.get(id))
    }

    /// All repositories, sorted by name.
    pub fn repositories(&self) -> Vec<&Repository> {
        let mut all: Vec<&Repository> = self.repositories.values().map(Arc::as_ref).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn package_digests(&self, id: &RepositoryId) -> PackageDigests {
        self.packages
            .get(id)
            .map(|digests| digests.as_ref().clone())
            .unwrap_or_default()
    }

    pub fn audit_log(&self, id: &RepositoryId) -> Vec<AuditEntry> {
        self.audit
            .iter()
            .filter(|entry| entry.repository_id == *id)
            .cloned()
            .collect()
    }

    /// Apply a mutation, enforcing every store invariant.
    ///
    /// On error the state is left unchanged.
    pub fn apply(&mut self, mutation: &Mutation) -> StoreResult<()> {
        match mutation {
            Mutation::Insert(repository) => {
                if self.repositories.contains_key(&repository.id) {
                    return Err(StoreError::DuplicateId(repository.id));
                }
                if self.names.contains_key(&repository.name) {
                    return Err(StoreError::NameTaken(repository.name.clone()));
                }
                self.names.insert(repository.name.clone(), repository.id);
                self.repositories
                    .insert(repository.id, Arc::new(repository.clone()));
            }
            Mutation::UpdateMetadata {
                id,
                expected_owner,
                edit,
            } => {
                let current = self.require(id)?;
                if current.owner != *expected_owner {
                    return Err(StoreError::OwnerChanged(*id));
                }
                let previous_name = current.name.clone();
                if let Some(other) = self.names.get(&edit.name) {
                    if other != id {
                        return Err(StoreError::NameTaken(edit.name.clone()));
                    }
                }
                self.names.remove(&previous_name);
                self.names.insert(edit.name.clone(), *id);
                self.modify(id, |r| r.apply_edit(edit))?;
            }
            Mutation::Delete(id) => {
                let name = self.require(id)?.name.clone();
                self.names.remove(&name);
                self.repositories.remove(id);
                self.packages.remove(id);
            }
            Mutation::SetVerifiedPublisher { id, verified } => {
                self.modify(id, |r| r.verified_publisher = *verified)?;
            }
            Mutation::SetOfficial { id, official } => {
                self.modify(id, |r| r.official = *official)?;
            }
            Mutation::SetTrackingResult { id, errors, at } => {
                self.modify(id, |r| {
                    r.last_tracking_errors = Some(errors.clone());
                    r.last_tracking_ts = Some(*at);
                })?;
            }
            Mutation::SetDigest { id, digest } => {
                self.modify(id, |r| r.digest = Some(digest.clone()))?;
            }
            Mutation::CommitTracking { id, commit } => {
                // A cycle that read a URL since replaced only records its outcome.
                let stale = commit.is_stale_for(&self.require(id)?.url);
                self.modify(id, |r| {
                    if !stale {
                        if let Some(digest) = &commit.digest {
                            r.digest = Some(digest.clone());
                        }
                        r.retry_pending = commit.partial;
                    }
                    r.last_tracking_errors = Some(commit.errors.clone());
                    r.last_tracking_ts = Some(commit.at);
                })?;
                if !stale && (!commit.upserted.is_empty() || !commit.removed.is_empty()) {
                    let digests = Arc::make_mut(self.packages.entry(*id).or_default());
                    for key in &commit.removed {
                        digests.remove(key);
                    }
                    for (key, digest) in &commit.upserted {
                        digests.insert(key.clone(), digest.clone());
                    }
                }
            }
            Mutation::SetOwner { id, owner, audit } => {
                if self.require(id)?.owner != audit.previous_owner {
                    return Err(StoreError::OwnerChanged(*id));
                }
                self.modify(id, |r| {
                    r.owner = *owner;
                    r.verified_publisher = false;
                })?;
                self.audit.push(audit.clone());
            }
        }
        Ok(())
    }

    fn require(&self, id: &RepositoryId) -> StoreResult<&Repository> {
        self.get(id)
            .ok_or_else(|| StoreError::RepositoryNotFound(id.to_string()))
    }

    fn modify<F>(&mut self, id: &RepositoryId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Repository),
    {
        let record = self
            .repositories
            .get_mut(id)
            .ok_or_else(|| StoreError::RepositoryNotFound(id.to_string()))?;
        f(Arc::make_mut(record));
        Ok(())
    }
}
