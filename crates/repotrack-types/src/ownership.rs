use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{OrganizationId, RepositoryId, UserId};
use crate::repository::Owner;

/// The authenticated principal performing an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Caller {
    pub user_id: UserId,
}

impl Caller {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// A registered user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub alias: String,
    pub email: String,
}

/// A registered organization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
}

/// A request by a user to take ownership of a repository, optionally on
/// behalf of an organization.
///
/// Claims only live for the duration of the claim or transfer workflow;
/// the lasting trace is the [`AuditEntry`] written when it succeeds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipClaim {
    pub repository_name: String,
    pub target_organization: Option<String>,
    pub requesting_user: UserId,
}

/// A recorded ownership change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub repository_id: RepositoryId,
    pub previous_owner: Owner,
    pub new_owner: Owner,
    pub performed_by: UserId,
    /// Whether the change was gated by the ownership verification predicate.
    pub ownership_claim: bool,
    pub at: DateTime<Utc>,
}
