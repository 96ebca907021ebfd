use std::path::{Path, PathBuf};

use tokio::runtime::Handle;
use tracing::{debug, warn};

/// A strategy-produced directory, removed once the cycle is done with it.
///
/// A finished cycle calls [`dispose`](Self::dispose). Dropping covers every
/// other way a cycle can end, including timeouts and cancellation; inside
/// a runtime the removal then runs on the blocking pool.
pub(crate) struct Workspace {
    path: PathBuf,
    disposed: bool,
}

impl Workspace {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            disposed: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory on the blocking pool and wait for it.
    pub(crate) async fn dispose(mut self) {
        self.disposed = true;
        let path = std::mem::take(&mut self.path);
        if let Err(e) = tokio::task::spawn_blocking(move || remove(&path)).await {
            warn!(error = %e, "workspace removal task failed");
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove(&path));
            }
            Err(_) => remove(&path),
        }
    }
}

fn remove(path: &Path) {
    match std::fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "workspace removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove workspace"),
    }
}
