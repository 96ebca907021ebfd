use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use repotrack_types::RepositoryId;

/// One lock per repository, shared by every run of a tracker.
#[derive(Debug, Default)]
pub struct RepositoryLocks {
    locks: Mutex<HashMap<RepositoryId, Arc<AsyncMutex<()>>>>,
}

impl RepositoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the repository's lock without waiting. `None` if another cycle
    /// holds it.
    pub fn try_acquire(&self, id: &RepositoryId) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(*id).or_default())
        };
        lock.try_lock_owned().ok()
    }

    /// Drop locks of repositories that are gone and not currently held.
    pub fn retain(&self, live: impl Fn(&RepositoryId) -> bool) {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.retain(|id, lock| live(id) || Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
