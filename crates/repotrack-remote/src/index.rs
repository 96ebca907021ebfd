use serde::{Deserialize, Serialize};

use repotrack_digest::{ContentHasher, DigestResult};
use repotrack_types::PackageKey;

use crate::error::{RemoteError, RemoteResult};

/// One package version listed by an index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub version: String,
    /// Digest published by the remote for this version.
    pub digest: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl IndexEntry {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            digest: digest.into(),
            urls: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    pub fn key(&self) -> PackageKey {
        PackageKey::new(&self.name, &self.version)
    }
}

/// A parsed index: every package version a declarative remote publishes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub entries: Vec<IndexEntry>,
}

impl IndexDocument {
    pub fn new(entries: Vec<IndexEntry>) -> RemoteResult<Self> {
        let doc = Self { entries };
        doc.validate()?;
        Ok(doc)
    }

    /// Reject entries without a name, version or digest, and duplicate keys.
    pub fn validate(&self) -> RemoteResult<()> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.entries {
            if entry.name.is_empty() || entry.version.is_empty() {
                return Err(RemoteError::InvalidIndex(format!(
                    "entry with empty name or version: {:?}@{:?}",
                    entry.name, entry.version
                )));
            }
            if entry.digest.is_empty() {
                return Err(RemoteError::InvalidIndex(format!(
                    "{}@{} has no digest",
                    entry.name, entry.version
                )));
            }
            if !seen.insert(entry.key()) {
                return Err(RemoteError::InvalidIndex(format!(
                    "duplicate entry {}@{}",
                    entry.name, entry.version
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digest of the index contents, independent of entry order.
    pub fn digest(&self) -> DigestResult<String> {
        let mut entries: Vec<&IndexEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        ContentHasher::INDEX.hash_json(&entries)
    }
}
