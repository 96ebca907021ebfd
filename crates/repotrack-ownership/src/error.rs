use repotrack_remote::RemoteError;
use repotrack_store::StoreError;
use repotrack_types::ErrorKind;

/// Errors from ownership operations.
#[derive(Debug, thiserror::Error)]
pub enum OwnershipError {
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("organization not found: {0}")]
    OrganizationNotFound(String),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl OwnershipError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RepositoryNotFound(_) => ErrorKind::NotFound,
            Self::OrganizationNotFound(_) | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::UnknownUser(_) | Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Store(e) => e.kind(),
            Self::Remote(e) => e.kind(),
        }
    }
}

pub type OwnershipResult<T> = Result<T, OwnershipError>;
