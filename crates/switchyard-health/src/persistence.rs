use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{ProviderStateRegistry, StateStore};

/// Periodically snapshots the registry into a [`StateStore`]
#[derive(Clone)]
pub struct PersistenceJob {
    registry: Arc<ProviderStateRegistry>,
    store: Arc<dyn StateStore>,
    interval: Duration,
}

impl PersistenceJob {
    pub fn new(registry: Arc<ProviderStateRegistry>, store: Arc<dyn StateStore>, interval: Duration) -> Self {
        Self {
            registry,
            store,
            interval,
        }
    }

    /// Pre-populate the registry from the store
    ///
    /// Failure is logged and leaves the registry empty.
    pub async fn restore(&self) -> usize {
        match self.store.load_all().await {
            Ok(snapshots) => {
                let loaded = self.registry.load(&snapshots);
                tracing::info!(store = self.store.name(), loaded, "restored provider runtime state");
                loaded
            }
            Err(e) => {
                tracing::error!(store = self.store.name(), error = %e, "failed to restore provider runtime state");
                0
            }
        }
    }

    /// Write the current registry snapshot, returning the number of rows
    pub async fn flush(&self) -> usize {
        let snapshots = self.registry.all();
        if snapshots.is_empty() {
            return 0;
        }

        match self.store.upsert(&snapshots).await {
            Ok(()) => {
                tracing::debug!(store = self.store.name(), rows = snapshots.len(), "flushed provider runtime state");
                snapshots.len()
            }
            Err(e) => {
                tracing::error!(store = self.store.name(), error = %e, "failed to persist provider runtime state");
                0
            }
        }
    }

    /// Flush on every interval until `shutdown`, then flush once more
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.flush().await;
                    }
                }
            }

            let rows = self.flush().await;
            tracing::info!(store = self.store.name(), rows, "final provider state flush");
        })
    }
}
