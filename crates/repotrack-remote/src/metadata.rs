use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use repotrack_types::{PackageKey, Repository};

use crate::error::{RemoteError, RemoteResult};

/// Name of the metadata file at the root of a repository.
pub const METADATA_FILE: &str = "repotrack-repo.yml";

/// Publisher-maintained metadata stored alongside a repository's content.
///
/// ```yaml
/// repositoryID: 0190a4a4-7f38-7c31-9d53-4c2f0e8a1b2c
/// owners:
///   - name: Jane Doe
///     email: jane@acme.io
/// ignore:
///   - name: legacy-chart
///   - name: redis
///     version: 0.1.0
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    /// Proves publisher control when it matches the catalog id.
    #[serde(rename = "repositoryID", default)]
    pub repository_id: Option<String>,
    #[serde(default)]
    pub owners: Vec<MetadataOwner>,
    #[serde(default)]
    pub ignore: Vec<IgnoreRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataOwner {
    #[serde(default)]
    pub name: String,
    pub email: String,
}

/// Excludes a package, or a single version of it, from ingestion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRule {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl IgnoreRule {
    pub fn matches(&self, key: &PackageKey) -> bool {
        self.name == key.name
            && self
                .version
                .as_deref()
                .map_or(true, |version| version == key.version)
    }
}

impl RepositoryMetadata {
    pub fn from_yaml(path: &Path, data: &str) -> RemoteResult<Self> {
        let metadata: Self =
            serde_yaml::from_str(data).map_err(|e| RemoteError::InvalidMetadata {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        metadata.validate(path)?;
        Ok(metadata)
    }

    fn validate(&self, path: &Path) -> RemoteResult<()> {
        let invalid = |reason: &str| RemoteError::InvalidMetadata {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.repository_id.as_deref() == Some("") {
            return Err(invalid("repositoryID is empty"));
        }
        if self.owners.iter().any(|o| o.email.trim().is_empty()) {
            return Err(invalid("owner without email"));
        }
        if self.ignore.iter().any(|rule| rule.name.trim().is_empty()) {
            return Err(invalid("ignore entry without name"));
        }
        Ok(())
    }

    /// Whether any ignore rule excludes `key`.
    pub fn is_ignored(&self, key: &PackageKey) -> bool {
        self.ignore.iter().any(|rule| rule.matches(key))
    }

    /// Case-insensitive owner lookup by email.
    pub fn has_owner(&self, email: &str) -> bool {
        self.owners
            .iter()
            .any(|owner| owner.email.trim().eq_ignore_ascii_case(email.trim()))
    }
}

/// Read and validate a metadata file.
pub fn load_metadata(path: &Path) -> RemoteResult<RepositoryMetadata> {
    let data = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RemoteError::MetadataNotFound(path.to_path_buf()),
        _ => RemoteError::io(path, e),
    })?;
    RepositoryMetadata::from_yaml(path, &data)
}

/// Metadata at the root of a cloned or exported workspace, if present.
pub fn load_workspace_metadata(workspace: &Path) -> RemoteResult<Option<RepositoryMetadata>> {
    match load_metadata(&workspace.join(METADATA_FILE)) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(RemoteError::MetadataNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Fetches a repository's metadata file from its remote.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// `Ok(None)` when the repository publishes no metadata file.
    async fn fetch(&self, repository: &Repository) -> RemoteResult<Option<RepositoryMetadata>>;
}
