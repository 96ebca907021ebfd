use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use repotrack_types::Repository;

use crate::error::RemoteResult;
use crate::index::IndexDocument;

/// Fetches source-controlled repositories into a local workspace.
///
/// The returned directory belongs to the caller, who removes it once the
/// cycle is over.
#[async_trait]
pub trait Cloner: Send + Sync {
    /// Cheap probe of the remote head (e.g. the tip commit of the branch).
    /// `None` means the remote cannot say, and the caller must fetch.
    async fn remote_digest(&self, repository: &Repository) -> RemoteResult<Option<String>>;

    /// Clone into a fresh workspace. Returns the path and the resolved ref.
    async fn clone_repository(
        &self,
        cancel: &CancellationToken,
        repository: &Repository,
    ) -> RemoteResult<(PathBuf, String)>;
}

/// Loads declarative index documents.
#[async_trait]
pub trait IndexLoader: Send + Sync {
    async fn remote_digest(&self, repository: &Repository) -> RemoteResult<Option<String>>;

    async fn load_index(&self, repository: &Repository) -> RemoteResult<IndexDocument>;
}

/// Transforms a non-native repository format into the ingestible layout.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn remote_digest(&self, repository: &Repository) -> RemoteResult<Option<String>>;

    /// Export into a fresh workspace owned by the caller.
    async fn export_repository(
        &self,
        cancel: &CancellationToken,
        repository: &Repository,
    ) -> RemoteResult<PathBuf>;
}
