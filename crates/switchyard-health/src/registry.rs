use std::sync::Arc;

use dashmap::DashMap;

use crate::{ProviderId, ProviderRuntimeState, StateSnapshot};

/// Concurrent map from provider identity to its live state
///
/// Constructed once at startup and shared by the selector, the
/// orchestrator, and the persistence job.
#[derive(Default)]
pub struct ProviderStateRegistry {
    states: DashMap<ProviderId, Arc<ProviderRuntimeState>>,
}

impl ProviderStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for `id`, created with defaults on first access
    ///
    /// Concurrent first accesses resolve to one shared allocation.
    pub fn get_or_create(&self, id: &ProviderId, name: &str) -> Arc<ProviderRuntimeState> {
        if let Some(state) = self.states.get(id) {
            return Arc::clone(&state);
        }

        let entry = self
            .states
            .entry(id.clone())
            .or_insert_with(|| Arc::new(ProviderRuntimeState::new(id.clone(), name)));

        Arc::clone(&entry)
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<ProviderRuntimeState>> {
        self.states.get(id).map(|state| Arc::clone(&state))
    }

    /// Snapshot of every tracked provider, sorted by id
    pub fn all(&self) -> Vec<StateSnapshot> {
        let mut snapshots: Vec<_> = self.states.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        snapshots
    }

    /// Pre-populate from persisted snapshots
    ///
    /// Existing live entries win over persisted ones.
    pub fn load(&self, snapshots: &[StateSnapshot]) -> usize {
        let mut loaded = 0;

        for snapshot in snapshots {
            self.states.entry(snapshot.provider_id.clone()).or_insert_with(|| {
                loaded += 1;
                Arc::new(ProviderRuntimeState::from_snapshot(snapshot))
            });
        }

        loaded
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
