use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// How the content of a repository kind is obtained from its remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchMode {
    /// A declarative index document enumerates packages and their digests.
    Index,
    /// Source-controlled content cloned into a temporary workspace.
    Clone,
    /// Content transformed into the ingestible layout before ingestion.
    Export,
}

/// The closed set of repository kinds.
///
/// The kind determines which remote strategy applies to a repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepositoryKind {
    /// Chart repositories.
    Helm,
    HelmPlugin,
    /// Security rule sets.
    Falco,
    /// Policy sets.
    Opa,
    /// Operator bundles.
    Olm,
    TektonTask,
    Krew,
    Keda,
    CoreDns,
    Container,
}

impl RepositoryKind {
    /// Every kind, in declaration order.
    pub const ALL: [RepositoryKind; 10] = [
        Self::Helm,
        Self::HelmPlugin,
        Self::Falco,
        Self::Opa,
        Self::Olm,
        Self::TektonTask,
        Self::Krew,
        Self::Keda,
        Self::CoreDns,
        Self::Container,
    ];

    /// Stable slug used in configuration files and JSON.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Helm => "helm",
            Self::HelmPlugin => "helm-plugin",
            Self::Falco => "falco",
            Self::Opa => "opa",
            Self::Olm => "olm",
            Self::TektonTask => "tekton-task",
            Self::Krew => "krew",
            Self::Keda => "keda",
            Self::CoreDns => "core-dns",
            Self::Container => "container",
        }
    }

    /// The fetch mode the kind's remote strategy must implement.
    pub fn fetch_mode(&self) -> FetchMode {
        match self {
            Self::Helm | Self::Container => FetchMode::Index,
            Self::Olm => FetchMode::Export,
            Self::HelmPlugin
            | Self::Falco
            | Self::Opa
            | Self::TektonTask
            | Self::Krew
            | Self::Keda
            | Self::CoreDns => FetchMode::Clone,
        }
    }
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for RepositoryKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.slug() == s)
            .ok_or_else(|| TypeError::UnknownKind(s.to_string()))
    }
}
