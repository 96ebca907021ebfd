use repotrack_types::{ErrorKind, RepositoryId};

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested repository does not exist.
    #[error("repository not found: {0}")]
    RepositoryNotFound(String),

    /// Another repository already uses this name.
    #[error("repository name already taken: {0}")]
    NameTaken(String),

    /// The owner moved since the change was prepared.
    #[error("repository owner changed concurrently: {0}")]
    OwnerChanged(RepositoryId),

    /// A repository with this id was already inserted.
    #[error("repository id already exists: {0}")]
    DuplicateId(RepositoryId),

    /// A journal record could not be decoded or replayed.
    #[error("corrupt journal at offset {offset}: {reason}")]
    CorruptJournal { offset: u64, reason: String },

    /// An earlier append failed and could not be rolled back.
    #[error("journal unusable after a failed append")]
    JournalPoisoned,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the journal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding a store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RepositoryNotFound(_) => ErrorKind::NotFound,
            Self::NameTaken(_) | Self::DuplicateId(_) | Self::OwnerChanged(_) => ErrorKind::Conflict,
            Self::CorruptJournal { .. }
            | Self::JournalPoisoned
            | Self::Serialization(_)
            | Self::Io(_)
            | Self::LockPoisoned => ErrorKind::Internal,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
