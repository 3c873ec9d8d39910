//! Shared key-value cache store
//!
//! The store is the only mutable resource shared across service replicas.
//! Every record carries a TTL so stuck state self-heals, and the atomic
//! `set_if_absent` primitive doubles as the cross-replica lock. Key
//! enumeration exists for maintenance sweeps only and must never appear on a
//! hot read path.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::errors::{AppError, StoreError};

pub mod keys;
mod memory;
mod redis;

pub use memory::MemoryCacheStore;
pub use redis::{RedisCacheStore, RedisStoreConfig};

/// Contract every store backend satisfies
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value that expires after `ttl`
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomic create-if-absent with TTL; returns false when the key is held.
    /// This is the locking primitive: locks are never explicitly released,
    /// they expire.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Enumerate keys matching a glob pattern. Maintenance sweeps only.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}

/// Read a JSON record from the store
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, AppError> {
    match store.get(key).await? {
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(AppError::CacheCorruption {
                key: key.to_string(),
                message: e.to_string(),
            }),
        },
        None => Ok(None),
    }
}

/// Read a JSON record, treating corruption as a miss
///
/// A malformed entry is deleted so the next refresh starts clean.
pub async fn get_json_lenient<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, AppError> {
    match get_json(store, key).await {
        Ok(value) => Ok(value),
        Err(AppError::CacheCorruption { key, message }) => {
            warn!("Deleting corrupted cache entry {}: {}", key, message);
            store.delete(&key).await?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Write a JSON record with a TTL
pub async fn set_json<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), AppError> {
    let raw = serde_json::to_string(value).map_err(StoreError::from)?;
    store.set(key, &raw, ttl).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Record {
        value: u32,
    }

    #[tokio::test]
    async fn test_json_round_trip() {
        let store = MemoryCacheStore::new();

        set_json(&store, "k", &Record { value: 7 }, Duration::from_secs(60))
            .await
            .unwrap();

        let back: Option<Record> = get_json(&store, "k").await.unwrap();
        assert_eq!(back, Some(Record { value: 7 }));
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_evicted() {
        let store = MemoryCacheStore::new();
        store
            .set("k", "not json at all", Duration::from_secs(60))
            .await
            .unwrap();

        let strict: Result<Option<Record>, _> = get_json(&store, "k").await;
        assert!(matches!(strict, Err(AppError::CacheCorruption { .. })));

        let lenient: Option<Record> = get_json_lenient(&store, "k").await.unwrap();
        assert_eq!(lenient, None);

        // The corrupted record is gone
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
