//! Shared key-value contract (spec §4.6), grounded on `spark-core`'s
//! trait-object service contracts (`Arc<dyn Trait>` + `async_trait`). The
//! in-process implementation here backs single-node deployments; clustered
//! deployments provide their own [`Store`] (e.g. Redis-backed) from outside
//! this crate.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CodeError;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CodeError>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CodeError>;
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration)
        -> Result<(), CodeError>;
    /// Atomically increments the integer stored at `key` (starting from 0)
    /// and returns the new value. Per spec §4.6, an expired entry resets to
    /// 0 before the increment is applied.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CodeError>;
    async fn expire_key(&self, key: &str, ttl: Duration) -> Result<(), CodeError>;
    async fn remove(&self, key: &str) -> Result<(), CodeError>;
    async fn close(&self);
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|d| now >= d)
    }
}

/// In-memory [`Store`] backed by a sharded concurrent map.
#[derive(Clone, Default)]
pub struct LocalStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CodeError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CodeError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CodeError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64, CodeError> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: 0i64.to_le_bytes().to_vec(),
            expires_at: None,
        });

        if entry.is_expired(now) {
            entry.value = 0i64.to_le_bytes().to_vec();
            entry.expires_at = None;
        }

        let current = i64::from_le_bytes(entry.value.clone().try_into().map_err(|_| {
            CodeError::warning("stored value is not a counter").with_meta("key", key)
        })?);
        let next = current + delta;
        entry.value = next.to_le_bytes().to_vec();
        Ok(next)
    }

    async fn expire_key(&self, key: &str, ttl: Duration) -> Result<(), CodeError> {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(())
            }
            None => Err(CodeError::not_found("key not found").with_meta("key", key)),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), CodeError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn close(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_resets_after_expiry() {
        let store = LocalStore::new();
        assert_eq!(store.incr("counter", 1).await.unwrap(), 1);
        assert_eq!(store.incr("counter", 1).await.unwrap(), 2);

        store
            .expire_key("counter", Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.incr("counter", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn get_returns_none_past_ttl() {
        let store = LocalStore::new();
        store
            .set_with_ttl("k", b"v".to_vec(), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
