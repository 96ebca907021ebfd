use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use repotrack_remote::{load_metadata, RepositoryMetadata, StrategyRegistry};
use repotrack_store::{Directory, RepositoryStore};
use repotrack_types::{
    validate_repository_name, validate_repository_url, AuditEntry, Caller, Credentials,
    CredentialsEdit, Owner, PackageKey, Repository, RepositoryDraft, RepositoryEdit, RepositoryId,
    RepositoryKind, TrackingCommit,
};

use crate::availability::ResourceKind;
use crate::error::{CatalogError, CatalogResult};

/// Repository record lifecycle over an injected store.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn RepositoryStore>,
    directory: Arc<dyn Directory>,
    strategies: Arc<StrategyRegistry>,
}

impl Catalog {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        directory: Arc<dyn Directory>,
        strategies: Arc<StrategyRegistry>,
    ) -> Self {
        Self {
            store,
            directory,
            strategies,
        }
    }

    pub fn store(&self) -> &Arc<dyn RepositoryStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn strategies(&self) -> &Arc<StrategyRegistry> {
        &self.strategies
    }

    // ---- Lifecycle ----

    /// Register a new repository.
    ///
    /// With `org_name` the organization owns it and the caller must be a
    /// member; otherwise the caller does.
    pub fn add(
        &self,
        caller: &Caller,
        org_name: Option<&str>,
        draft: RepositoryDraft,
    ) -> CatalogResult<Repository> {
        validate_draft(&draft)?;

        let owner = match org_name.filter(|name| !name.is_empty()) {
            Some(name) => {
                let org = self
                    .directory
                    .organization_by_name(name)?
                    .ok_or_else(|| CatalogError::OrganizationNotFound(name.to_string()))?;
                if !self.directory.is_member(&caller.user_id, &org.id)? {
                    return Err(CatalogError::PermissionDenied(format!(
                        "user {} is not a member of {}",
                        caller.user_id, org.name
                    )));
                }
                Owner::Organization(org.id)
            }
            None => Owner::User(caller.user_id),
        };

        let repository = Repository::from_draft(draft, owner);
        self.store.insert(repository.clone())?;
        info!(
            id = %repository.id,
            name = %repository.name,
            kind = %repository.kind,
            %owner,
            "repository added"
        );
        Ok(repository)
    }

    /// Apply caller-editable changes to an existing repository.
    ///
    /// Name, display name, URL, branch and the disabled flag are taken
    /// from `repository`. Credentials are replaced only when present, so a
    /// record read without credentials can be sent back unchanged; use
    /// [`update_with`](Self::update_with) to clear them. Everything else is
    /// kept from the stored record.
    pub fn update(&self, caller: &Caller, repository: Repository) -> CatalogResult<Repository> {
        let current = self.require(&repository.id)?;
        if repository.kind != current.kind {
            return Err(CatalogError::InvalidArgument(format!(
                "repository kind cannot change ({} -> {})",
                current.kind, repository.kind
            )));
        }
        self.update_with(caller, &repository.id, RepositoryEdit::from_record(&repository))
    }

    /// Apply an explicit edit to an existing repository.
    ///
    /// The edit is merged into the stored record in one store step, so
    /// concurrent tracking results survive. A URL change discards the
    /// stored digest. If the owner changes between the permission check and
    /// the write, the edit fails with a conflict.
    pub fn update_with(
        &self,
        caller: &Caller,
        id: &RepositoryId,
        edit: RepositoryEdit,
    ) -> CatalogResult<Repository> {
        let current = self.require(id)?;
        self.authorize(caller, &current)?;
        validate_repository_name(&edit.name)?;
        validate_repository_url(&edit.url)?;
        if let CredentialsEdit::Set(credentials) = &edit.credentials {
            validate_credentials(credentials)?;
        }

        let url_changed = edit.url != current.url;
        let updated = self.store.update_metadata(id, current.owner, edit)?;
        info!(id = %updated.id, name = %updated.name, url_changed, "repository updated");
        Ok(updated.with_credentials(false))
    }

    /// Delete a repository by name. A second delete fails with not found.
    pub fn delete(&self, caller: &Caller, name: &str) -> CatalogResult<()> {
        let current = self.require_name(name)?;
        self.authorize(caller, &current)?;
        self.store.delete(&current.id)?;
        info!(id = %current.id, name, "repository deleted");
        Ok(())
    }

    // ---- Reads ----

    pub fn get_by_id(&self, id: &RepositoryId, include_credentials: bool) -> CatalogResult<Repository> {
        Ok(self.require(id)?.with_credentials(include_credentials))
    }

    pub fn get_by_name(&self, name: &str, include_credentials: bool) -> CatalogResult<Repository> {
        Ok(self.require_name(name)?.with_credentials(include_credentials))
    }

    pub fn get_by_kind(
        &self,
        kind: RepositoryKind,
        include_credentials: bool,
    ) -> CatalogResult<Vec<Repository>> {
        Ok(scrub(self.store.list_by_kind(kind)?, include_credentials))
    }

    pub fn get_all(&self, include_credentials: bool) -> CatalogResult<Vec<Repository>> {
        Ok(scrub(self.store.list()?, include_credentials))
    }

    pub fn get_all_json(&self, include_credentials: bool) -> CatalogResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.get_all(include_credentials)?)?)
    }

    pub fn get_by_kind_json(
        &self,
        kind: RepositoryKind,
        include_credentials: bool,
    ) -> CatalogResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.get_by_kind(kind, include_credentials)?)?)
    }

    /// Repositories owned directly by the caller, as JSON.
    pub fn get_owned_by_user_json(
        &self,
        caller: &Caller,
        include_credentials: bool,
    ) -> CatalogResult<Vec<u8>> {
        let owned = self.store.list_by_owner(&Owner::User(caller.user_id))?;
        Ok(serde_json::to_vec(&scrub(owned, include_credentials))?)
    }

    /// Repositories owned by an organization the caller belongs to, as JSON.
    pub fn get_owned_by_org_json(
        &self,
        caller: &Caller,
        org_name: &str,
        include_credentials: bool,
    ) -> CatalogResult<Vec<u8>> {
        let org = self
            .directory
            .organization_by_name(org_name)?
            .ok_or_else(|| CatalogError::OrganizationNotFound(org_name.to_string()))?;
        if !self.directory.is_member(&caller.user_id, &org.id)? {
            return Err(CatalogError::PermissionDenied(format!(
                "user {} is not a member of {}",
                caller.user_id, org.name
            )));
        }
        let owned = self.store.list_by_owner(&Owner::Organization(org.id))?;
        Ok(serde_json::to_vec(&scrub(owned, include_credentials))?)
    }

    pub fn audit_log(&self, id: &RepositoryId) -> CatalogResult<Vec<AuditEntry>> {
        self.require(id)?;
        Ok(self.store.audit_log(id)?)
    }

    /// Whether `value` is still free in the given namespace.
    pub fn check_availability(&self, kind: ResourceKind, value: &str) -> CatalogResult<bool> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CatalogError::InvalidArgument(format!("empty {kind}")));
        }
        let available = match kind {
            ResourceKind::RepositoryName => self.store.get_by_name(value)?.is_none(),
            ResourceKind::RepositoryUrl => self.store.find_by_url(value)?.is_none(),
            ResourceKind::OrganizationName => self.directory.organization_by_name(value)?.is_none(),
            ResourceKind::UserAlias => self.directory.user_by_alias(value)?.is_none(),
        };
        debug!(%kind, value, available, "availability checked");
        Ok(available)
    }

    // ---- Narrow mutators ----

    pub fn set_verified_publisher(&self, id: &RepositoryId, verified: bool) -> CatalogResult<()> {
        self.store.set_verified_publisher(id, verified)?;
        info!(%id, verified, "verified publisher flag set");
        Ok(())
    }

    pub fn set_official(&self, id: &RepositoryId, official: bool) -> CatalogResult<()> {
        self.store.set_official(id, official)?;
        info!(%id, official, "official flag set");
        Ok(())
    }

    /// Record the outcome of a tracking attempt, stamped now.
    pub fn set_last_tracking_results(&self, id: &RepositoryId, errors: &str) -> CatalogResult<()> {
        self.store.set_tracking_result(id, errors, Utc::now())?;
        Ok(())
    }

    pub fn update_digest(&self, id: &RepositoryId, digest: &str) -> CatalogResult<()> {
        self.store.set_digest(id, digest)?;
        Ok(())
    }

    pub fn get_packages_digest(&self, id: &RepositoryId) -> CatalogResult<HashMap<PackageKey, String>> {
        Ok(self.store.package_digests(id)?)
    }

    /// Persist everything one tracking cycle produced in a single step.
    pub fn record_tracking(&self, id: &RepositoryId, commit: TrackingCommit) -> CatalogResult<()> {
        debug!(
            %id,
            upserted = commit.upserted.len(),
            removed = commit.removed.len(),
            clean = commit.is_clean(),
            "recording tracking result"
        );
        self.store.commit_tracking(id, commit)?;
        Ok(())
    }

    // ---- Remote ----

    /// Current remote digest, via the strategy registered for the kind.
    /// `None` when the remote cannot report one.
    pub async fn get_remote_digest(&self, repository: &Repository) -> CatalogResult<Option<String>> {
        Ok(self.strategies.remote_digest(repository).await?)
    }

    /// Parse a repository metadata file.
    pub fn get_metadata(&self, path: &Path) -> CatalogResult<RepositoryMetadata> {
        Ok(load_metadata(path)?)
    }

    // ---- Helpers ----

    fn require(&self, id: &RepositoryId) -> CatalogResult<Repository> {
        self.store
            .get(id)?
            .ok_or_else(|| CatalogError::RepositoryNotFound(id.to_string()))
    }

    fn require_name(&self, name: &str) -> CatalogResult<Repository> {
        self.store
            .get_by_name(name)?
            .ok_or_else(|| CatalogError::RepositoryNotFound(name.to_string()))
    }

    fn authorize(&self, caller: &Caller, repository: &Repository) -> CatalogResult<()> {
        if self.directory.acts_for(&caller.user_id, &repository.owner)? {
            Ok(())
        } else {
            Err(CatalogError::PermissionDenied(format!(
                "user {} cannot modify {}",
                caller.user_id, repository.name
            )))
        }
    }
}

fn validate_draft(draft: &RepositoryDraft) -> CatalogResult<()> {
    validate_repository_name(&draft.name)?;
    validate_repository_url(&draft.url)?;
    if let Some(credentials) = &draft.credentials {
        validate_credentials(credentials)?;
    }
    Ok(())
}

fn validate_credentials(credentials: &Credentials) -> CatalogResult<()> {
    if credentials.username.is_empty() {
        return Err(CatalogError::InvalidArgument(
            "credentials require a username".into(),
        ));
    }
    Ok(())
}

fn scrub(repositories: Vec<Repository>, include_credentials: bool) -> Vec<Repository> {
    repositories
        .into_iter()
        .map(|r| r.with_credentials(include_credentials))
        .collect()
}
