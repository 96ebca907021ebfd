//! Tracker orchestrator for repotrack.
//!
//! One call to [`Tracker::run`] is one tracking cycle over the catalog:
//!
//! ```text
//! Idle -> remote digest -> unchanged? -> record skip -> Idle
//!                       -> changed    -> clone/load/export -> ingest
//!                                      -> record result   -> Idle
//! ```
//!
//! # Guarantees
//!
//! 1. The remote digest is checked before any heavyweight fetch.
//! 2. A repository digest is only replaced after its content was fetched;
//!    total failures leave the previous digest in place.
//! 3. Only packages whose own digest moved are ingested again.
//! 4. Repositories are processed by a bounded pool; one repository's
//!    failure or panic never stops the others.
//! 5. No two cycles work on the same repository at once, even across
//!    overlapping runs.
//! 6. A cancelled repository writes nothing.

pub mod config;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod report;
pub mod tracker;
mod workspace;

pub use config::TrackerConfig;
pub use error::{IngestError, TrackerError, TrackerResult};
pub use ingest::{DiscoveredPackage, PackageIngester, PackageSource};
pub use locks::RepositoryLocks;
pub use report::{CycleReport, RepositoryOutcome, RepositoryReport};
pub use tracker::Tracker;
