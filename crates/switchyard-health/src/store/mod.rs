//! Durable homes for provider runtime-state snapshots
//!
//! Stores are best-effort: the in-memory registry is authoritative and a
//! lost snapshot only means health is relearned from zero.

mod file;
mod memory;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use switchyard_config::{PersistenceBackend, PersistenceConfig};

pub use self::{file::FileStore, memory::MemoryStore, redis::RedisStore};
use crate::{HealthError, StateSnapshot};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Every persisted snapshot, used to pre-populate the registry
    async fn load_all(&self) -> Result<Vec<StateSnapshot>, HealthError>;

    /// Insert or replace the given snapshots keyed by provider id
    async fn upsert(&self, snapshots: &[StateSnapshot]) -> Result<(), HealthError>;

    /// Backend name for log lines
    fn name(&self) -> &'static str;
}

/// Build the configured store, `None` when persistence is disabled
///
/// # Errors
///
/// Returns an error if the backend is missing its location or the
/// Redis URL is invalid
pub fn from_config(config: &PersistenceConfig) -> Result<Option<Arc<dyn StateStore>>, HealthError> {
    let store: Arc<dyn StateStore> = match config.backend {
        PersistenceBackend::None => return Ok(None),
        PersistenceBackend::File => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| HealthError::Store("file backend requires a path".to_owned()))?;
            Arc::new(FileStore::new(path))
        }
        PersistenceBackend::Redis => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| HealthError::Store("redis backend requires a url".to_owned()))?;
            Arc::new(RedisStore::new(url, config.key.clone())?)
        }
    };

    Ok(Some(store))
}
