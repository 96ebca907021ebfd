//! Persistence boundary for repotrack.
//!
//! The catalog, the ownership authority and the tracker only talk to storage
//! through the [`RepositoryStore`] and [`Directory`] traits.
//!
//! # Backends
//!
//! - [`MemoryStore`] -- copy-on-write snapshot store, optionally backed by
//!   an append-only [`Journal`] for durability
//! - [`InMemoryDirectory`] -- users, organizations and memberships
//!
//! # Design Rules
//!
//! 1. Repository names are unique across the whole store.
//! 2. Every mutation is applied to a private copy of the state, journaled,
//!    and only then published; readers see the old or the new state, never
//!    a mix.
//! 3. Readers never wait for a writer's I/O.
//! 4. Deleting a repository deletes its package digests.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod directory;
pub mod error;
pub mod journal;
pub mod memory;
pub mod state;
pub mod traits;

pub use directory::{Directory, InMemoryDirectory};
pub use error::{StoreError, StoreResult};
pub use journal::{Journal, JournalConfig, JournalRecord, SyncMode};
pub use memory::MemoryStore;
pub use state::{CatalogState, Mutation};
pub use traits::RepositoryStore;
