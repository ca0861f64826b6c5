use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;

use super::StateStore;
use crate::{HealthError, ProviderId, StateSnapshot};

/// Process-local store, used in tests and as a no-op sink
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<ProviderId, StateSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<StateSnapshot>, HealthError> {
        Ok(self.rows.lock().unwrap_or_else(|e| e.into_inner()).values().cloned().collect())
    }

    async fn upsert(&self, snapshots: &[StateSnapshot]) -> Result<(), HealthError> {
        let mut rows = self.rows.lock().unwrap_or_else(|e| e.into_inner());
        for snapshot in snapshots {
            rows.insert(snapshot.provider_id.clone(), snapshot.clone());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
