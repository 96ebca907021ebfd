//! Remote strategies for repotrack.
//!
//! A strategy is the kind-specific adapter that knows how to reach a
//! repository's remote: source-controlled kinds are cloned, declarative
//! kinds publish an index, and a few formats are exported into the
//! ingestible layout first. The engine only sees the traits defined here;
//! concrete adapters are injected through the [`StrategyRegistry`].
//!
//! # Ingestible layout
//!
//! Cloned and exported workspaces are read as
//! `<root>/<package-name>/<version>/...`, see [`scan_layout`].

pub mod error;
pub mod index;
pub mod layout;
pub mod metadata;
pub mod registry;
pub mod strategy;

pub use error::{RemoteError, RemoteResult};
pub use index::{IndexDocument, IndexEntry};
pub use layout::{scan_layout, LayoutPackage};
pub use metadata::{
    load_metadata, load_workspace_metadata, IgnoreRule, MetadataOwner, MetadataSource,
    RepositoryMetadata, METADATA_FILE,
};
pub use registry::{Strategy, StrategyRegistry};
pub use strategy::{Cloner, Exporter, IndexLoader};
