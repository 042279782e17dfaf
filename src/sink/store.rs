//! Key-value stores for conversation ids.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use tokio::sync::{OnceCell, RwLock};

use crate::error::LiveError;
use crate::sink::KvStore;

/// Connection attempts made by the manager before a call gives up.
const REDIS_CONNECT_RETRIES: usize = 1;

/// Redis-backed store using an auto-reconnecting connection manager.
///
/// The connection is opened on first use, so an unreachable server only
/// fails the individual `get`/`set` calls.
pub struct RedisStore {
    client: redis::Client,
    manager: OnceCell<ConnectionManager>,
}

impl RedisStore {
    /// Validates `redis_url` without connecting.
    pub fn new(redis_url: &str) -> Result<Self, LiveError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            manager: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, LiveError> {
        let manager = self
            .manager
            .get_or_try_init(|| {
                ConnectionManager::new_with_backoff(
                    self.client.clone(),
                    2,
                    100,
                    REDIS_CONNECT_RETRIES,
                )
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LiveError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LiveError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }
}

/// Process-local store, used when no Redis URL is configured.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, LiveError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LiveError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
