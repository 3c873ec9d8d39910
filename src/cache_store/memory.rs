//! In-memory cache store
//!
//! Single-process backend with the same TTL and create-if-absent semantics
//! as Redis. Used by the test suites and usable for single-replica
//! deployments without a shared store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::CacheStore;
use crate::errors::StoreError;

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryCacheStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(slot: &Slot) -> Option<String> {
        (Instant::now() < slot.expires_at).then(|| slot.value.clone())
    }

    /// Force-expire a key, regardless of its remaining TTL
    pub async fn expire_now(&self, key: &str) {
        self.slots.lock().await.remove(key);
    }

    /// Number of live keys; test observability
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.slots
            .lock()
            .await
            .values()
            .filter(|slot| now < slot.expires_at)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut slots = self.slots.lock().await;
        match slots.get(key) {
            Some(slot) => match Self::live_value(slot) {
                Some(value) => Ok(Some(value)),
                None => {
                    slots.remove(key);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().await;
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(key) {
            if Self::live_value(slot).is_some() {
                return Ok(false);
            }
        }
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.slots.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let slots = self.slots.lock().await;
        Ok(slots
            .iter()
            .filter(|(key, slot)| now < slot.expires_at && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// Minimal glob matching: `*` matches any run of characters
fn glob_match(pattern: &str, value: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == value;
    }

    let mut rest = value;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 && !pattern.ends_with('*') {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}
