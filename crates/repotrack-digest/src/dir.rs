use std::fs::File;
use std::io;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{DigestError, DigestResult};
use crate::hasher::ContentHasher;

/// Digest every regular file below `root`.
///
/// Entries are visited in file-name order and each one contributes its
/// `/`-separated relative path, its length, and its contents, so the result
/// is independent of the platform and of directory iteration order. Empty
/// directories do not contribute. Symlinks contribute their target path and
/// are never followed.
pub fn digest_dir(root: &Path) -> DigestResult<String> {
    if !root.is_dir() {
        return Err(DigestError::NotADirectory(root.to_path_buf()));
    }

    let mut hasher = ContentHasher::PACKAGE.start();
    let mut files = 0usize;

    for entry in WalkDir::new(root).sort_by_file_name().follow_links(false) {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        hasher.update(relative.as_bytes());
        hasher.update(&[0]);

        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|source| DigestError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
            hasher.update(b"link:");
            hasher.update(target.to_string_lossy().as_bytes());
        } else {
            let io_err = |source| DigestError::Io {
                path: entry.path().to_path_buf(),
                source,
            };
            let mut file = File::open(entry.path()).map_err(io_err)?;
            let len = file.metadata().map_err(io_err)?.len();
            hasher.update(&len.to_le_bytes());
            io::copy(&mut file, &mut hasher).map_err(io_err)?;
        }
        files += 1;
    }

    debug!(root = %root.display(), files, "directory digested");
    Ok(hex::encode(hasher.finalize().as_bytes()))
}
