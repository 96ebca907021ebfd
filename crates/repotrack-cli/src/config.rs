use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use repotrack_store::JournalConfig;
use repotrack_tracker::TrackerConfig;

pub const DEFAULT_CONFIG_FILE: &str = "repotrack.toml";

/// Top-level configuration file: a `[store]` and a `[tracker]` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: JournalConfig,
    pub tracker: TrackerConfig,
}

impl AppConfig {
    /// Load `explicit` if given (it must exist), otherwise
    /// `./repotrack.toml` if present, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.tracker.validate()?;
        Ok(config)
    }
}
