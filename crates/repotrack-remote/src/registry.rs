use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use repotrack_types::{FetchMode, Repository, RepositoryKind};

use crate::error::{RemoteError, RemoteResult};
use crate::strategy::{Cloner, Exporter, IndexLoader};

/// The adapter that fetches one repository kind.
#[derive(Clone)]
pub enum Strategy {
    Clone(Arc<dyn Cloner>),
    Index(Arc<dyn IndexLoader>),
    Export(Arc<dyn Exporter>),
}

impl Strategy {
    pub fn mode(&self) -> FetchMode {
        match self {
            Self::Clone(_) => FetchMode::Clone,
            Self::Index(_) => FetchMode::Index,
            Self::Export(_) => FetchMode::Export,
        }
    }

    /// Cheap probe of the remote's current digest.
    pub async fn remote_digest(&self, repository: &Repository) -> RemoteResult<Option<String>> {
        match self {
            Self::Clone(cloner) => cloner.remote_digest(repository).await,
            Self::Index(loader) => loader.remote_digest(repository).await,
            Self::Export(exporter) => exporter.remote_digest(repository).await,
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Strategy::{:?}", self.mode())
    }
}

/// Maps every repository kind to its strategy.
///
/// A strategy can only be registered for kinds whose [`FetchMode`] it
/// implements, so dispatch never has to second-guess the pairing.
#[derive(Clone, Debug, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<RepositoryKind, Strategy>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: RepositoryKind, strategy: Strategy) -> RemoteResult<()> {
        let expected = kind.fetch_mode();
        if strategy.mode() != expected {
            return Err(RemoteError::StrategyMismatch {
                kind,
                expected,
                actual: strategy.mode(),
            });
        }
        debug!(%kind, mode = ?expected, "strategy registered");
        self.strategies.insert(kind, strategy);
        Ok(())
    }

    /// Register one cloner for every clone-based kind.
    pub fn register_cloner(&mut self, cloner: Arc<dyn Cloner>) {
        self.register_all(FetchMode::Clone, Strategy::Clone(cloner));
    }

    /// Register one index loader for every index-based kind.
    pub fn register_index_loader(&mut self, loader: Arc<dyn IndexLoader>) {
        self.register_all(FetchMode::Index, Strategy::Index(loader));
    }

    /// Register one exporter for every export-based kind.
    pub fn register_exporter(&mut self, exporter: Arc<dyn Exporter>) {
        self.register_all(FetchMode::Export, Strategy::Export(exporter));
    }

    fn register_all(&mut self, mode: FetchMode, strategy: Strategy) {
        for kind in RepositoryKind::ALL {
            if kind.fetch_mode() == mode {
                self.strategies.insert(kind, strategy.clone());
            }
        }
    }

    pub fn get(&self, kind: RepositoryKind) -> RemoteResult<&Strategy> {
        self.strategies
            .get(&kind)
            .ok_or(RemoteError::NoStrategy(kind))
    }

    pub fn supports(&self, kind: RepositoryKind) -> bool {
        self.strategies.contains_key(&kind)
    }

    /// Kinds with a registered strategy, sorted.
    pub fn kinds(&self) -> Vec<RepositoryKind> {
        let mut kinds: Vec<RepositoryKind> = self.strategies.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Current remote digest for `repository` via its kind's strategy.
    pub async fn remote_digest(&self, repository: &Repository) -> RemoteResult<Option<String>> {
        self.get(repository.kind)?.remote_digest(repository).await
    }
}
