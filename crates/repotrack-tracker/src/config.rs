use std::time::Duration;

use serde::{Deserialize, Serialize};

use repotrack_types::{Repository, RepositoryKind};

use crate::error::{TrackerError, TrackerResult};

/// Configuration for tracking cycles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Repositories tracked concurrently.
    pub workers: usize,
    /// Upper bound on one repository's cycle, in seconds.
    pub repository_timeout_secs: u64,
    /// Only track these repository names. Empty means all.
    pub repositories: Vec<String>,
    /// Only track these kinds. Empty means all.
    pub kinds: Vec<RepositoryKind>,
    /// Always fetch, even when the remote digest is unchanged.
    pub bypass_digest_check: bool,
    pub skip_disabled: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            repository_timeout_secs: 900,
            repositories: Vec::new(),
            kinds: Vec::new(),
            bypass_digest_check: false,
            skip_disabled: true,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> TrackerResult<()> {
        if self.workers == 0 {
            return Err(TrackerError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.repository_timeout_secs == 0 {
            return Err(TrackerError::InvalidConfig(
                "repository_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn repository_timeout(&self) -> Duration {
        Duration::from_secs(self.repository_timeout_secs)
    }

    /// Whether `repository` takes part in a cycle under this configuration.
    pub fn selects(&self, repository: &Repository) -> bool {
        if self.skip_disabled && repository.disabled {
            return false;
        }
        if !self.repositories.is_empty() && !self.repositories.contains(&repository.name) {
            return false;
        }
        self.kinds.is_empty() || self.kinds.contains(&repository.kind)
    }
}
