//! Digest comparator for repotrack.
//!
//! Digests are the cheap "has anything changed" signal used by the tracker.
//! A repository digest is compared first; when it moved, per-package digests
//! decide which packages actually need to be ingested again.
//!
//! All digests are domain-separated BLAKE3 hashes rendered as lowercase hex.

pub mod compare;
pub mod dir;
pub mod error;
pub mod hasher;

pub use compare::{combine, repository_changed, PackageDiff};
pub use dir::digest_dir;
pub use error::{DigestError, DigestResult};
pub use hasher::ContentHasher;
