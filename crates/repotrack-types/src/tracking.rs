use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::package::PackageKey;

/// Everything a tracking cycle persists, applied as one atomic mutation.
///
/// A cycle either commits all of this or nothing, so a reader never sees
/// the new repository digest without the package digests that go with it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingCommit {
    /// New repository digest. `None` leaves the stored digest untouched.
    pub digest: Option<String>,
    /// Package digests to insert or replace.
    pub upserted: BTreeMap<PackageKey, String>,
    /// Packages no longer present in the remote.
    pub removed: Vec<PackageKey>,
    /// Concatenated error text; empty when the cycle was clean.
    pub errors: String,
    /// Some packages failed after the digest moved and must be retried.
    pub partial: bool,
    /// The URL the cycle read from. When the stored URL no longer matches,
    /// only the outcome is recorded.
    pub source_url: Option<String>,
    pub at: DateTime<Utc>,
}

impl TrackingCommit {
    /// An empty, clean commit stamped at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            digest: None,
            upserted: BTreeMap::new(),
            removed: Vec::new(),
            errors: String::new(),
            partial: false,
            source_url: None,
            at,
        }
    }

    /// A commit that only records the cycle outcome.
    pub fn result_only(errors: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            errors: errors.into(),
            ..Self::new(at)
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether this commit was read from something other than `url`.
    pub fn is_stale_for(&self, url: &str) -> bool {
        self.source_url.as_deref().is_some_and(|source| source != url)
    }
}
