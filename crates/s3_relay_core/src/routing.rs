use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ROUTING_CONFIG_PATH: &str = "./config/target.json";

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("failed to read routing config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid routing config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no target prefix configured for '{0}'")]
    UnmappedPrefix(String),
}

/// Maps a filename stem to the destination prefix segment in the target
/// bucket. Lookups are exact-match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    target_prefix: BTreeMap<String, String>,
}

impl RoutingTable {
    pub fn new(target_prefix: BTreeMap<String, String>) -> Self {
        Self { target_prefix }
    }

    pub fn from_json_str(text: &str) -> Result<Self, RoutingError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RoutingError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| RoutingError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn lookup(&self, prefix_id: &str) -> Result<&str, RoutingError> {
        self.target_prefix
            .get(prefix_id)
            .map(String::as_str)
            .ok_or_else(|| RoutingError::UnmappedPrefix(prefix_id.to_string()))
    }
}
