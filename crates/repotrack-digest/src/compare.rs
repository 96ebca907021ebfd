use std::collections::{HashMap, HashSet};

use repotrack_types::PackageKey;

use crate::hasher::ContentHasher;

/// Whether the remote content differs from what was last tracked.
///
/// Returns `true` when nothing was tracked yet or when the remote cannot
/// report a digest cheaply; only an exact match counts as unchanged.
pub fn repository_changed(stored: Option<&str>, remote: Option<&str>) -> bool {
    match (stored, remote) {
        (Some(stored), Some(remote)) => stored.is_empty() || stored != remote,
        _ => true,
    }
}

/// Order-independent repository digest built from package digests.
pub fn combine<'a, I>(digests: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut digests: Vec<&str> = digests.into_iter().collect();
    digests.sort_unstable();
    let mut hasher = ContentHasher::REPOSITORY.start();
    for digest in digests {
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Package-level comparison between stored and freshly discovered digests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageDiff {
    /// Packages that are new or whose digest differs from the stored one.
    pub changed: Vec<PackageKey>,
    /// Packages whose digest matches the stored one.
    pub unchanged: Vec<PackageKey>,
    /// Stored packages that are no longer present in the remote.
    pub removed: Vec<PackageKey>,
}

impl PackageDiff {
    /// Compare discovered `(key, digest)` pairs against the stored digests.
    ///
    /// A discovered package with an empty digest is always treated as
    /// changed, since there is nothing to compare it with.
    pub fn compute<'a, I>(stored: &HashMap<PackageKey, String>, discovered: I) -> Self
    where
        I: IntoIterator<Item = (&'a PackageKey, &'a str)>,
    {
        let mut diff = Self::default();
        let mut seen: HashSet<&PackageKey> = HashSet::new();

        for (key, digest) in discovered {
            if !seen.insert(key) {
                continue;
            }
            match stored.get(key) {
                Some(previous) if !digest.is_empty() && previous == digest => {
                    diff.unchanged.push(key.clone())
                }
                _ => diff.changed.push(key.clone()),
            }
        }

        diff.removed = stored
            .keys()
            .filter(|key| !seen.contains(key))
            .cloned()
            .collect();

        diff.changed.sort();
        diff.unchanged.sort();
        diff.removed.sort();
        diff
    }

    pub fn is_changed(&self, key: &PackageKey) -> bool {
        self.changed.binary_search(key).is_ok()
    }

    /// `true` when no package was added, changed or removed.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}
