use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use repotrack_types::{Repository, RepositoryId, RepositoryKind};

/// How one repository's cycle ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum RepositoryOutcome {
    /// Remote digest matched; nothing fetched.
    Unchanged,
    Synced {
        ingested: usize,
        removed: usize,
        unchanged: usize,
        ignored: usize,
    },
    /// Fetched, but some packages failed. The repository digest moved.
    Partial {
        ingested: usize,
        removed: usize,
        failed: usize,
    },
    /// Nothing fetched; the previous digest stays authoritative.
    Failed { error: String },
    /// Aborted by cancellation; nothing was written.
    Cancelled,
    /// Another cycle holds this repository.
    Busy,
    /// Deleted, disabled or deselected after the cycle listed it.
    Skipped,
}

impl RepositoryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Synced { .. } => "synced",
            Self::Partial { .. } => "partial",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
            Self::Busy => "busy",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RepositoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced {
                ingested,
                removed,
                unchanged,
                ignored,
            } => write!(
                f,
                "synced ({ingested} ingested, {removed} removed, {unchanged} unchanged, {ignored} ignored)"
            ),
            Self::Partial {
                ingested,
                removed,
                failed,
            } => write!(f, "partial ({ingested} ingested, {removed} removed, {failed} failed)"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryReport {
    pub id: RepositoryId,
    pub name: String,
    pub kind: RepositoryKind,
    #[serde(flatten)]
    pub outcome: RepositoryOutcome,
}

impl RepositoryReport {
    pub fn new(repository: &Repository, outcome: RepositoryOutcome) -> Self {
        Self {
            id: repository.id,
            name: repository.name.clone(),
            kind: repository.kind,
            outcome,
        }
    }
}

/// Result of one [`Tracker::run`](crate::Tracker::run).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per selected repository, sorted by name.
    pub repositories: Vec<RepositoryReport>,
    /// Workers that panicked; their repositories are missing above.
    pub worker_failures: usize,
}

impl CycleReport {
    pub fn get(&self, name: &str) -> Option<&RepositoryOutcome> {
        self.repositories
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }

    pub fn count(&self, label: &str) -> usize {
        self.repositories
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }

    /// Whether every repository ended unchanged or fully synced.
    pub fn is_clean(&self) -> bool {
        self.worker_failures == 0
            && self.repositories.iter().all(|r| {
                matches!(
                    r.outcome,
                    RepositoryOutcome::Unchanged
                        | RepositoryOutcome::Synced { .. }
                        | RepositoryOutcome::Skipped
                )
            })
    }
}
