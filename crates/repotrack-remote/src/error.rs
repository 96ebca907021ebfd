use std::path::PathBuf;

use repotrack_digest::DigestError;
use repotrack_types::{ErrorKind, FetchMode, RepositoryKind};

/// Errors raised while talking to a remote or reading what it produced.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Network failure, timeout or server error. Retried next cycle.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed for {url}")]
    Authentication { url: String },

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("invalid metadata file {path}: {reason}")]
    InvalidMetadata { path: PathBuf, reason: String },

    #[error("metadata file not found: {0}")]
    MetadataNotFound(PathBuf),

    #[error("invalid workspace layout at {path}: {reason}")]
    InvalidLayout { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Digest(#[from] DigestError),

    #[error("no strategy registered for kind {0}")]
    NoStrategy(RepositoryKind),

    #[error("kind {kind} is fetched by {expected:?}, not {actual:?}")]
    StrategyMismatch {
        kind: RepositoryKind,
        expected: FetchMode,
        actual: FetchMode,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl RemoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) | Self::Authentication { .. } => ErrorKind::RemoteUnavailable,
            Self::InvalidIndex(_)
            | Self::InvalidMetadata { .. }
            | Self::InvalidLayout { .. }
            | Self::StrategyMismatch { .. } => ErrorKind::InvalidArgument,
            Self::MetadataNotFound(_) | Self::NoStrategy(_) => ErrorKind::NotFound,
            Self::Digest(e) => e.kind(),
            Self::Io { .. } | Self::Cancelled => ErrorKind::Internal,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;
