use std::time::Duration;

use repotrack_catalog::CatalogError;
use repotrack_digest::DigestError;
use repotrack_remote::RemoteError;
use repotrack_types::ErrorKind;

/// Errors from a tracking cycle.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error("tracking timed out after {0:?}")]
    Timeout(Duration),

    #[error("tracking cancelled")]
    Cancelled,

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("invalid tracker configuration: {0}")]
    InvalidConfig(String),
}

impl TrackerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Catalog(e) => e.kind(),
            Self::Remote(e) => e.kind(),
            Self::Digest(e) => e.kind(),
            Self::Timeout(_) => ErrorKind::RemoteUnavailable,
            Self::InvalidConfig(_) => ErrorKind::InvalidArgument,
            Self::Cancelled | Self::Worker(_) => ErrorKind::Internal,
        }
    }
}

/// Failure to ingest or unregister a single package.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct IngestError(pub String);

impl IngestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
