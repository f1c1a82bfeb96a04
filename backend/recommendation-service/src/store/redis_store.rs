use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use super::KeyValueStore;
use crate::error::{AppError, Result};
use crate::utils::with_timeout;

/// Redis-backed store. `ConnectionManager` is a cheap clone over one
/// multiplexed connection, so no lock is held around reads.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    timeout: Duration,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager, timeout })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = with_timeout("redis", self.timeout, async move {
            conn.get::<_, Option<String>>(key)
                .await
                .map_err(AppError::from)
        })
        .await?;

        debug!(key, found = value.is_some(), "Redis GET");
        Ok(value)
    }
}
