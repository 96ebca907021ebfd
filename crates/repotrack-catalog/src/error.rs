use repotrack_remote::RemoteError;
use repotrack_store::StoreError;
use repotrack_types::{ErrorKind, TypeError};

/// Errors returned by catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RepositoryNotFound(_) => ErrorKind::NotFound,
            Self::OrganizationNotFound(_) | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Type(e) => e.kind(),
            Self::Store(e) => e.kind(),
            Self::Remote(e) => e.kind(),
            Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
