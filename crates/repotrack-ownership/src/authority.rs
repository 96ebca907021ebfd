use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use repotrack_remote::MetadataSource;
use repotrack_store::{Directory, RepositoryStore};
use repotrack_types::{AuditEntry, Caller, Owner, OwnershipClaim, Repository, RepositoryId};

use crate::error::{OwnershipError, OwnershipResult};
use crate::verifier::OwnershipVerifier;

/// Executes ownership claims, transfers and publisher verification.
pub struct OwnershipAuthority {
    store: Arc<dyn RepositoryStore>,
    directory: Arc<dyn Directory>,
    verifier: Arc<dyn OwnershipVerifier>,
    metadata: Arc<dyn MetadataSource>,
}

impl OwnershipAuthority {
    pub fn new(
        store: Arc<dyn RepositoryStore>,
        directory: Arc<dyn Directory>,
        verifier: Arc<dyn OwnershipVerifier>,
        metadata: Arc<dyn MetadataSource>,
    ) -> Self {
        Self {
            store,
            directory,
            verifier,
            metadata,
        }
    }

    /// Take ownership of `name` for the caller, or for `org_name` when
    /// given. Requires the verification predicate to hold.
    pub async fn claim_ownership(
        &self,
        caller: &Caller,
        name: &str,
        org_name: Option<&str>,
    ) -> OwnershipResult<Repository> {
        self.transfer(caller, name, org_name, true).await
    }

    /// Move `name` to `org_name`, or to the caller when `org_name` is
    /// `None`.
    ///
    /// With `ownership_claim` the move is gated by the verifier. Without it
    /// the caller must already act for both the current and the new owner.
    pub async fn transfer(
        &self,
        caller: &Caller,
        name: &str,
        org_name: Option<&str>,
        ownership_claim: bool,
    ) -> OwnershipResult<Repository> {
        let claim = OwnershipClaim {
            repository_name: name.to_string(),
            target_organization: org_name.filter(|n| !n.is_empty()).map(str::to_string),
            requesting_user: caller.user_id,
        };

        let repository = self
            .store
            .get_by_name(&claim.repository_name)?
            .ok_or_else(|| OwnershipError::RepositoryNotFound(claim.repository_name.clone()))?;
        let claimant = self
            .directory
            .user(&claim.requesting_user)?
            .ok_or_else(|| OwnershipError::UnknownUser(claim.requesting_user.to_string()))?;

        let target = self.resolve_target(&claim)?;
        if target == repository.owner {
            return Err(OwnershipError::InvalidArgument(format!(
                "{} is already owned by {target}",
                repository.name
            )));
        }

        if ownership_claim {
            if !self.verifier.verify(&claimant, &repository).await? {
                warn!(
                    repository = %repository.name,
                    claimant = %claimant.alias,
                    "ownership claim rejected"
                );
                return Err(OwnershipError::PermissionDenied(format!(
                    "{} could not prove control of {}",
                    claimant.alias, repository.name
                )));
            }
        } else if !self.directory.acts_for(&caller.user_id, &repository.owner)? {
            return Err(OwnershipError::PermissionDenied(format!(
                "{} does not control {}",
                claimant.alias, repository.name
            )));
        }

        let audit = AuditEntry {
            repository_id: repository.id,
            previous_owner: repository.owner,
            new_owner: target,
            performed_by: caller.user_id,
            ownership_claim,
            at: Utc::now(),
        };
        self.store.set_owner(&repository.id, target, audit)?;
        info!(
            repository = %repository.name,
            from = %repository.owner,
            to = %target,
            ownership_claim,
            "repository ownership changed"
        );

        self.store
            .get(&repository.id)?
            .ok_or_else(|| OwnershipError::RepositoryNotFound(repository.name.clone()))
    }

    /// Recompute the verified-publisher flag from the repository's metadata
    /// file: it holds when the file's `repositoryID` equals the catalog id.
    /// Writes only when the flag changes.
    pub async fn verify_publisher(&self, id: &RepositoryId) -> OwnershipResult<bool> {
        let repository = self
            .store
            .get(id)?
            .ok_or_else(|| OwnershipError::RepositoryNotFound(id.to_string()))?;

        let verified = match self.metadata.fetch(&repository).await? {
            Some(metadata) => metadata
                .repository_id
                .as_deref()
                .is_some_and(|declared| declared.trim() == repository.id.to_string()),
            None => false,
        };

        if verified != repository.verified_publisher {
            self.store.set_verified_publisher(id, verified)?;
            info!(repository = %repository.name, verified, "verified publisher flag updated");
        }
        Ok(verified)
    }

    /// The owner the claim asks for. The caller must belong to a target
    /// organization.
    fn resolve_target(&self, claim: &OwnershipClaim) -> OwnershipResult<Owner> {
        let Some(org_name) = claim.target_organization.as_deref() else {
            return Ok(Owner::User(claim.requesting_user));
        };
        let org = self
            .directory
            .organization_by_name(org_name)?
            .ok_or_else(|| OwnershipError::OrganizationNotFound(org_name.to_string()))?;
        if !self.directory.is_member(&claim.requesting_user, &org.id)? {
            return Err(OwnershipError::PermissionDenied(format!(
                "user {} is not a member of {}",
                claim.requesting_user, org.name
            )));
        }
        Ok(Owner::Organization(org.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use repotrack_remote::{MetadataOwner, RemoteError, RemoteResult, RepositoryMetadata};
    use repotrack_store::{InMemoryDirectory, MemoryStore};
    use repotrack_types::{
        ErrorKind, Organization, OrganizationId, RepositoryDraft, RepositoryKind, User, UserId,
    };

    use crate::verifier::MetadataOwnersVerifier;

    /// Serves whatever metadata the test puts in it.
    #[derive(Default)]
    struct StaticMetadata {
        metadata: Mutex<Option<RepositoryMetadata>>,
        offline: bool,
    }

    impl StaticMetadata {
        fn set(&self, metadata: RepositoryMetadata) {
            *self.metadata.lock().unwrap() = Some(metadata);
        }
    }

    #[async_trait]
    impl MetadataSource for StaticMetadata {
        async fn fetch(&self, _: &Repository) -> RemoteResult<Option<RepositoryMetadata>> {
            if self.offline {
                return Err(RemoteError::Unavailable("connection refused".into()));
            }
            Ok(self.metadata.lock().unwrap().clone())
        }
    }

    struct Fixture {
        authority: OwnershipAuthority,
        store: Arc<MemoryStore>,
        metadata: Arc<StaticMetadata>,
        alice: User,
        bob: User,
        acme: Organization,
        repo: Repository,
    }

    fn user(alias: &str) -> User {
        User {
            id: UserId::new(),
            alias: alias.into(),
            email: format!("{alias}@acme.io"),
        }
    }

    fn fixture_with(metadata: StaticMetadata) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let metadata = Arc::new(metadata);

        let alice = user("alice");
        let bob = user("bob");
        let acme = Organization {
            id: OrganizationId::new(),
            name: "acme-org".into(),
        };
        directory.insert_user(alice.clone()).unwrap();
        directory.insert_user(bob.clone()).unwrap();
        directory.insert_organization(acme.clone()).unwrap();
        directory.add_member(acme.id, bob.id).unwrap();

        let repo = Repository::from_draft(
            RepositoryDraft::new("acme/charts", "https://charts.acme.io", RepositoryKind::Helm),
            Owner::User(alice.id),
        );
        store.insert(repo.clone()).unwrap();

        let authority = OwnershipAuthority::new(
            store.clone(),
            directory,
            Arc::new(MetadataOwnersVerifier::new(metadata.clone())),
            metadata.clone(),
        );
        Fixture {
            authority,
            store,
            metadata,
            alice,
            bob,
            acme,
            repo,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(StaticMetadata::default())
    }

    fn owners(emails: &[&str]) -> RepositoryMetadata {
        RepositoryMetadata {
            owners: emails
                .iter()
                .map(|email| MetadataOwner {
                    name: String::new(),
                    email: email.to_string(),
                })
                .collect(),
            ..RepositoryMetadata::default()
        }
    }

    // ---- Test 1: claims ----

    #[tokio::test]
    async fn claim_without_proof_is_denied_and_owner_unchanged() {
        let f = fixture();
        f.metadata.set(owners(&["someone@else.io"]));

        let err = f
            .authority
            .claim_ownership(&Caller::new(f.bob.id), "acme/charts", Some("acme-org"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        let stored = f.store.get(&f.repo.id).unwrap().unwrap();
        assert_eq!(stored.owner, Owner::User(f.alice.id));
        assert!(f.store.audit_log(&f.repo.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn verified_claim_moves_repository_to_organization() {
        let f = fixture();
        f.store.set_verified_publisher(&f.repo.id, true).unwrap();
        f.metadata.set(owners(&["bob@acme.io"]));

        let moved = f
            .authority
            .claim_ownership(&Caller::new(f.bob.id), "acme/charts", Some("acme-org"))
            .await
            .unwrap();
        assert_eq!(moved.owner, Owner::Organization(f.acme.id));
        assert!(moved.owner.user_id().is_none());
        assert!(!moved.verified_publisher);

        let audit = f.store.audit_log(&f.repo.id).unwrap();
        assert_eq!(audit.len(), 1);
        assert!(audit[0].ownership_claim);
        assert_eq!(audit[0].previous_owner, Owner::User(f.alice.id));
        assert_eq!(audit[0].performed_by, f.bob.id);
    }

    #[tokio::test]
    async fn claim_into_foreign_organization_is_denied() {
        let f = fixture();
        f.metadata.set(owners(&["alice@acme.io"]));
        let err = f
            .authority
            .claim_ownership(&Caller::new(f.alice.id), "acme/charts", Some("acme-org"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn claim_of_missing_repository_is_not_found() {
        let f = fixture();
        let err = f
            .authority
            .claim_ownership(&Caller::new(f.bob.id), "nope", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn claim_with_unreachable_metadata_is_remote_unavailable() {
        let f = fixture_with(StaticMetadata {
            offline: true,
            ..StaticMetadata::default()
        });
        let err = f
            .authority
            .claim_ownership(&Caller::new(f.bob.id), "acme/charts", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    }

    // ---- Test 2: administrative transfers ----

    #[tokio::test]
    async fn admin_transfer_requires_control_of_source() {
        let f = fixture();
        let err = f
            .authority
            .transfer(&Caller::new(f.bob.id), "acme/charts", Some("acme-org"), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn admin_transfer_to_organization_and_back() {
        let f = fixture();
        // Alice joins acme so she controls both sides.
        let directory = InMemoryDirectory::new();
        directory.insert_user(f.alice.clone()).unwrap();
        directory.insert_organization(f.acme.clone()).unwrap();
        directory.add_member(f.acme.id, f.alice.id).unwrap();
        let authority = OwnershipAuthority::new(
            f.store.clone(),
            Arc::new(directory),
            Arc::new(MetadataOwnersVerifier::new(f.metadata.clone())),
            f.metadata.clone(),
        );
        let alice = Caller::new(f.alice.id);

        let moved = authority
            .transfer(&alice, "acme/charts", Some("acme-org"), false)
            .await
            .unwrap();
        assert_eq!(moved.owner, Owner::Organization(f.acme.id));

        let back = authority.transfer(&alice, "acme/charts", None, false).await.unwrap();
        assert_eq!(back.owner, Owner::User(f.alice.id));
        assert!(back.owner.organization_id().is_none());

        let audit = f.store.audit_log(&f.repo.id).unwrap();
        assert_eq!(audit.len(), 2);
        assert!(audit.iter().all(|entry| !entry.ownership_claim));
    }

    #[tokio::test]
    async fn transfer_to_current_owner_is_invalid() {
        let f = fixture();
        let err = f
            .authority
            .transfer(&Caller::new(f.alice.id), "acme/charts", None, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn transfer_to_unknown_organization_is_invalid() {
        let f = fixture();
        let err = f
            .authority
            .transfer(&Caller::new(f.alice.id), "acme/charts", Some("ghost-org"), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    // ---- Test 3: verified publisher ----

    #[tokio::test]
    async fn verify_publisher_follows_metadata_repository_id() {
        let f = fixture();
        assert!(!f.authority.verify_publisher(&f.repo.id).await.unwrap());

        f.metadata.set(RepositoryMetadata {
            repository_id: Some(f.repo.id.to_string()),
            ..RepositoryMetadata::default()
        });
        assert!(f.authority.verify_publisher(&f.repo.id).await.unwrap());
        assert!(f.store.get(&f.repo.id).unwrap().unwrap().verified_publisher);

        f.metadata.set(RepositoryMetadata {
            repository_id: Some(RepositoryId::new().to_string()),
            ..RepositoryMetadata::default()
        });
        assert!(!f.authority.verify_publisher(&f.repo.id).await.unwrap());
        assert!(!f.store.get(&f.repo.id).unwrap().unwrap().verified_publisher);
    }

    #[tokio::test]
    async fn verify_publisher_skips_write_when_unchanged() {
        let f = fixture();
        let before = f.store.snapshot().unwrap();
        assert!(!f.authority.verify_publisher(&f.repo.id).await.unwrap());
        assert!(Arc::ptr_eq(&before, &f.store.snapshot().unwrap()));
    }
}
