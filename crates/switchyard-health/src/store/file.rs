use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::StateStore;
use crate::{HealthError, ProviderId, StateSnapshot};

/// JSON snapshot file replaced atomically on every flush
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-merge-write cycles
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> Result<BTreeMap<ProviderId, StateSnapshot>, HealthError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(HealthError::Store(format!("failed to read {}: {e}", self.path.display()))),
        };

        let rows: Vec<StateSnapshot> = serde_json::from_slice(&raw)
            .map_err(|e| HealthError::Store(format!("corrupt snapshot file {}: {e}", self.path.display())))?;

        Ok(rows.into_iter().map(|row| (row.provider_id.clone(), row)).collect())
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn load_all(&self) -> Result<Vec<StateSnapshot>, HealthError> {
        Ok(self.read().await?.into_values().collect())
    }

    async fn upsert(&self, snapshots: &[StateSnapshot]) -> Result<(), HealthError> {
        let _guard = self.write_lock.lock().await;

        // A corrupt file is replaced rather than blocking every future flush
        let mut rows = self.read().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "discarding unreadable state snapshot");
            BTreeMap::new()
        });

        for snapshot in snapshots {
            rows.insert(snapshot.provider_id.clone(), snapshot.clone());
        }

        let body = serde_json::to_vec_pretty(&rows.into_values().collect::<Vec<_>>())
            .map_err(|e| HealthError::Store(format!("failed to serialize snapshots: {e}")))?;

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| HealthError::Store(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| HealthError::Store(format!("failed to replace {}: {e}", self.path.display())))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(std::ffi::OsStr::to_os_string).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderRuntimeState, ProviderStateRegistry};

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_merges_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::new(&path);

        let registry = ProviderStateRegistry::new();
        registry.get_or_create(&ProviderId::from("a"), "a");
        registry.get_or_create(&ProviderId::from("b"), "b");
        store.upsert(&registry.all()).await.unwrap();

        let updated = ProviderRuntimeState::new(ProviderId::from("b"), "renamed").snapshot();
        store.upsert(std::slice::from_ref(&updated)).await.unwrap();

        let rows = store.load_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].provider_name, "renamed");
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported_then_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();
        let store = FileStore::new(&path);

        assert!(matches!(store.load_all().await, Err(HealthError::Store(_))));

        let snapshot = ProviderRuntimeState::new(ProviderId::from("a"), "a").snapshot();
        store.upsert(&[snapshot]).await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }
}
