use keygate_tonic_core::keygate::{CacheKey, CacheStore, StoreError};
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::info;

/// Cache storage backed by a multiplexed, self-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisCacheStore {
    manager: ConnectionManager,
}

impl RedisCacheStore {
    /// Connects and issues a `PING` so a bad URL fails at startup.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = Client::open(url)?;
        let mut manager = ConnectionManager::new(client).await?;
        let pong: String = redis::cmd("PING").query_async(&mut manager).await?;
        info!(reply = %pong, "connected to redis");
        Ok(Self { manager })
    }
}

impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        conn.get(key.as_str()).await.map_err(StoreError::backend)
    }

    async fn set(&self, key: &CacheKey, value: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.set(key.as_str(), value)
            .await
            .map_err(StoreError::backend)
    }
}
