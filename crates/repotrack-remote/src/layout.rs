use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use repotrack_digest::digest_dir;
use repotrack_types::PackageKey;

use crate::error::{RemoteError, RemoteResult};

/// A package version found in an ingestible workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutPackage {
    pub key: PackageKey,
    pub path: PathBuf,
    pub digest: String,
}

/// Enumerate `<root>/<name>/<version>/` directories and digest each one.
///
/// Hidden entries (`.git`, `.github`, ...) and loose files at either level
/// are not packages and are skipped. Results are sorted by key.
pub fn scan_layout(root: &Path) -> RemoteResult<Vec<LayoutPackage>> {
    if !root.is_dir() {
        return Err(RemoteError::InvalidLayout {
            path: root.to_path_buf(),
            reason: "workspace root is not a directory".into(),
        });
    }

    let mut packages = Vec::new();
    for (name, package_dir) in subdirectories(root)? {
        for (version, version_dir) in subdirectories(&package_dir)? {
            let digest = digest_dir(&version_dir)?;
            packages.push(LayoutPackage {
                key: PackageKey::new(name.clone(), version),
                path: version_dir,
                digest,
            });
        }
    }
    packages.sort_by(|a, b| a.key.cmp(&b.key));

    debug!(root = %root.display(), packages = packages.len(), "workspace scanned");
    Ok(packages)
}

fn subdirectories(dir: &Path) -> RemoteResult<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    let entries = fs::read_dir(dir).map_err(|e| RemoteError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| RemoteError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| RemoteError::io(entry.path(), e))?;
        if !file_type.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            return Err(RemoteError::InvalidLayout {
                path: entry.path(),
                reason: "directory name is not valid UTF-8".into(),
            });
        };
        if name.starts_with('.') {
            continue;
        }
        out.push((name, entry.path()));
    }
    Ok(out)
}
