use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Namespace probed by [`Catalog::check_availability`](crate::Catalog::check_availability).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    RepositoryName,
    #[serde(rename = "repositoryURL")]
    RepositoryUrl,
    OrganizationName,
    UserAlias,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        Self::RepositoryName,
        Self::RepositoryUrl,
        Self::OrganizationName,
        Self::UserAlias,
    ];

    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RepositoryName => "repositoryName",
            Self::RepositoryUrl => "repositoryURL",
            Self::OrganizationName => "organizationName",
            Self::UserAlias => "userAlias",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CatalogError::InvalidArgument(format!("unknown resource kind: {s}")))
    }
}
