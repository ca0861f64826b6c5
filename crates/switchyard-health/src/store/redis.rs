use std::collections::HashMap;

use async_trait::async_trait;

use super::StateStore;
use crate::{HealthError, StateSnapshot};

/// One Redis hash, one field per provider id holding its JSON snapshot
pub struct RedisStore {
    client: redis::Client,
    key: String,
}

impl RedisStore {
    /// Create a store; connections are opened per operation
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis URL is invalid
    pub fn new(url: &str, key: String) -> Result<Self, HealthError> {
        let client = redis::Client::open(url).map_err(|e| HealthError::Store(format!("invalid redis URL: {e}")))?;
        Ok(Self { client, key })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, HealthError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| HealthError::Store(format!("redis connection failed: {e}")))
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn load_all(&self) -> Result<Vec<StateSnapshot>, HealthError> {
        use redis::AsyncCommands;

        let mut conn = self.connection().await?;
        let rows: HashMap<String, String> = conn
            .hgetall(&self.key)
            .await
            .map_err(|e| HealthError::Store(format!("HGETALL failed: {e}")))?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for (field, raw) in rows {
            match serde_json::from_str(&raw) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => tracing::warn!(provider_id = %field, error = %e, "skipping unreadable state row"),
            }
        }

        Ok(snapshots)
    }

    async fn upsert(&self, snapshots: &[StateSnapshot]) -> Result<(), HealthError> {
        if snapshots.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for snapshot in snapshots {
            match serde_json::to_string(snapshot) {
                Ok(raw) => {
                    pipe.hset(&self.key, snapshot.provider_id.as_str(), raw).ignore();
                }
                Err(e) => tracing::error!(provider_id = %snapshot.provider_id, error = %e, "failed to serialize state row"),
            }
        }

        let mut conn = self.connection().await?;
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| HealthError::Store(format!("HSET failed: {e}")))?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
