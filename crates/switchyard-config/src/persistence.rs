use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

/// Where provider runtime state is snapshotted between restarts
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: PersistenceBackend,
    /// Snapshot file for the `file` backend
    pub path: Option<PathBuf>,
    /// Connection URL for the `redis` backend
    pub url: Option<String>,
    /// Hash key holding one field per provider
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_flush_interval", deserialize_with = "crate::duration::deserialize")]
    pub flush_interval: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: PersistenceBackend::default(),
            path: None,
            url: None,
            key: default_key(),
            flush_interval: default_flush_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    /// State lives only in memory
    #[default]
    None,
    File,
    Redis,
}

fn default_key() -> String {
    "switchyard:provider_state".to_owned()
}

const fn default_flush_interval() -> Duration {
    Duration::from_secs(10)
}
