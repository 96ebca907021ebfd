use std::fmt;

use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("unknown repository kind: {0}")]
    UnknownKind(String),

    #[error("invalid repository name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid repository url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid package key: {0}")]
    InvalidPackageKey(String),
}

/// Error taxonomy shared by every repotrack crate.
///
/// Crate-level error enums map onto these categories through their `kind()`
/// methods so callers can branch on the category without matching every
/// variant of every crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    /// Uniqueness violation.
    Conflict,
    InvalidArgument,
    PermissionDenied,
    /// Transient network or authentication failure against a remote.
    RemoteUnavailable,
    /// Some packages failed while the repository fetch succeeded.
    PartialIngestFailure,
    Internal,
}

impl ErrorKind {
    /// Whether the tracker retries this category on the next cycle
    /// instead of surfacing it to a caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteUnavailable | Self::PartialIngestFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::InvalidArgument => "invalid argument",
            Self::PermissionDenied => "permission denied",
            Self::RemoteUnavailable => "remote unavailable",
            Self::PartialIngestFailure => "partial ingest failure",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl TypeError {
    /// Every type error is a malformed input.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}
