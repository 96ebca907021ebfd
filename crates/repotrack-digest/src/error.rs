use std::path::PathBuf;

use repotrack_types::ErrorKind;

/// Errors from digest computation.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

impl DigestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotADirectory(_) => ErrorKind::InvalidArgument,
            _ => ErrorKind::Internal,
        }
    }
}

/// Result alias for digest operations.
pub type DigestResult<T> = Result<T, DigestError>;
