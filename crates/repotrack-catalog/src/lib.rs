//! Repository catalog for repotrack.
//!
//! The [`Catalog`] owns the lifecycle of repository records: creation under
//! a user or organization, reads with credential scrubbing, updates,
//! deletion, availability probes, and the narrow mutators the tracker and
//! the ownership authority use to record their results.
//!
//! Every mutation goes through the injected [`RepositoryStore`], which is
//! responsible for atomicity and durability.
//!
//! [`RepositoryStore`]: repotrack_store::RepositoryStore

pub mod availability;
pub mod catalog;
pub mod error;

pub use availability::ResourceKind;
pub use catalog::Catalog;
pub use error::{CatalogError, CatalogResult};
