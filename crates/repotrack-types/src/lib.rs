//! Foundation types for repotrack.
//!
//! This crate provides the data model shared by every other repotrack crate:
//! repository records and their owners, package identities, ownership claims,
//! and the records produced by tracking cycles.
//!
//! # Key Types
//!
//! - [`Repository`] - a cataloged external source of packages
//! - [`RepositoryKind`] - the closed set of supported remote formats
//! - [`Owner`] - exactly one user or organization
//! - [`PackageKey`] - `name@version` identity scoped to a repository
//! - [`OwnershipClaim`] / [`AuditEntry`] - ownership workflow records
//! - [`TrackingCommit`] - the atomic result of a tracking cycle
//! - [`ErrorKind`] - error taxonomy shared by all crates

pub mod error;
pub mod ids;
pub mod kind;
pub mod names;
pub mod ownership;
pub mod package;
pub mod repository;
pub mod tracking;

pub use error::{ErrorKind, TypeError};
pub use ids::{OrganizationId, RepositoryId, UserId};
pub use kind::{FetchMode, RepositoryKind};
pub use names::{validate_repository_name, validate_repository_url};
pub use ownership::{AuditEntry, Caller, Organization, OwnershipClaim, User};
pub use package::PackageKey;
pub use repository::{Credentials, CredentialsEdit, Owner, Repository, RepositoryDraft, RepositoryEdit};
pub use tracking::TrackingCommit;
