use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use repotrack_remote::MetadataSource;
use repotrack_types::{Repository, User};

use crate::error::OwnershipResult;

/// Out-of-band proof that a user controls a repository's remote.
#[async_trait]
pub trait OwnershipVerifier: Send + Sync {
    async fn verify(&self, claimant: &User, repository: &Repository) -> OwnershipResult<bool>;
}

/// Accepts a claim when the claimant's email is listed among the owners in
/// the repository's published metadata file.
pub struct MetadataOwnersVerifier {
    source: Arc<dyn MetadataSource>,
}

impl MetadataOwnersVerifier {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl OwnershipVerifier for MetadataOwnersVerifier {
    async fn verify(&self, claimant: &User, repository: &Repository) -> OwnershipResult<bool> {
        let verified = match self.source.fetch(repository).await? {
            Some(metadata) => metadata.has_owner(&claimant.email),
            None => false,
        };
        debug!(
            repository = %repository.name,
            claimant = %claimant.alias,
            verified,
            "ownership verified against metadata owners"
        );
        Ok(verified)
    }
}
