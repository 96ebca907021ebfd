//! Ownership authority for repotrack.
//!
//! Repositories move between users and organizations either as an
//! administrative transfer by someone already in control of both sides, or
//! as a claim gated by an injected [`OwnershipVerifier`]. Every change is a
//! single store mutation that also clears the verified-publisher flag and
//! appends an audit entry.

pub mod authority;
pub mod error;
pub mod verifier;

pub use authority::OwnershipAuthority;
pub use error::{OwnershipError, OwnershipResult};
pub use verifier::{MetadataOwnersVerifier, OwnershipVerifier};
