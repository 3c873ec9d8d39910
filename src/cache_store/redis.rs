//! Redis-backed cache store
//!
//! Production backend: a deadpool connection pool over Redis. `SET NX EX`
//! provides the atomic create-if-absent lock primitive.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::CacheStore;
use crate::errors::StoreError;

/// Connection settings for the Redis store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Redis URL (e.g. redis://localhost:6379)
    pub url: String,
    /// Connection pool size
    pub pool_size: usize,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
        }
    }
}

/// Redis cache store client
pub struct RedisCacheStore {
    pool: Pool,
}

impl RedisCacheStore {
    /// Connect and verify the store is reachable
    pub async fn new(config: &RedisStoreConfig) -> Result<Self, StoreError> {
        let pool = PoolConfig::from_url(&config.url)
            .builder()
            .map_err(|e| StoreError::Pool {
                message: format!("failed to create pool builder: {e}"),
            })?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Pool {
                message: format!("failed to build pool: {e}"),
            })?;

        let mut conn = pool.get().await.map_err(|e| StoreError::Pool {
            message: format!("failed to get connection: {e}"),
        })?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;

        info!(url = %config.url, "Connected to cache store");

        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool.get().await.map_err(|e| StoreError::Pool {
            message: format!("failed to get connection: {e}"),
        })
    }

    fn ttl_secs(ttl: Duration) -> u64 {
        // Zero-second TTLs are rejected by Redis; clamp to one second
        ttl.as_secs().max(1)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, Self::ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(Self::ttl_secs(ttl))
            .query_async(&mut *conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut *conn)
            .await?;
        Ok(keys)
    }
}
