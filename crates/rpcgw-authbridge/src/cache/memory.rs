use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use super::{CacheError, CacheStore};

/// In-process TTL map for single-instance deployments.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (Bytes, Instant)>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys, expired entries excluded.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut keys: Vec<String> = guard
            .iter()
            .filter(|(_, (_, expires_at))| *expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, (Bytes, Instant)>) -> T) -> T {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self.with_entries(|entries| match entries.get(key) {
            Some((value, expires_at)) if *expires_at > now => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_open()?;
        let expires_at = Instant::now() + ttl;
        self.with_entries(|entries| {
            entries.retain(|_, (_, at)| *at > Instant::now());
            entries.insert(key.to_string(), (value, expires_at));
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.ensure_open()?;
        self.with_entries(|entries| entries.remove(key));
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.ensure_open()
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.with_entries(HashMap::clear);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("k").await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_later_use() {
        let store = MemoryStore::new();
        store
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();
        store.close().await;
        store.close().await;
        assert!(matches!(store.get("k").await, Err(CacheError::Closed)));
        assert!(matches!(store.ping().await, Err(CacheError::Closed)));
    }
}
