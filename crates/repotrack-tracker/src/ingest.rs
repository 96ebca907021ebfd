use std::path::PathBuf;

use async_trait::async_trait;

use repotrack_types::{PackageKey, Repository};

use crate::error::IngestError;

/// Where a discovered package's content can be read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageSource {
    /// A version directory inside a cloned or exported workspace. Only
    /// valid until the cycle ends.
    Directory(PathBuf),
    /// Download locations published by an index.
    Urls(Vec<String>),
}

/// A package version found on the remote during a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredPackage {
    pub key: PackageKey,
    pub digest: String,
    pub source: PackageSource,
}

/// Registers package content with the rest of the system.
///
/// The tracker decides *which* packages need work; the ingester does it.
#[async_trait]
pub trait PackageIngester: Send + Sync {
    async fn ingest(
        &self,
        repository: &Repository,
        package: &DiscoveredPackage,
    ) -> Result<(), IngestError>;

    /// Remove a package version that disappeared from the remote.
    async fn unregister(&self, repository: &Repository, key: &PackageKey)
        -> Result<(), IngestError>;
}
