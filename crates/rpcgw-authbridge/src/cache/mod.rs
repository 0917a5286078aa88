//! Content-addressed verification cache.
//!
//! Entries are keyed by the hex SHA-256 of the raw API key so the plaintext
//! key never reaches the backing store. A disabled cache answers every read
//! with a miss and drops every write.

mod memory;
mod redis;

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::{CacheBackend, CacheConfig};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

const INIT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache address is required when the cache is enabled")]
    MissingAddress,
    #[error("cache liveness probe timed out")]
    ProbeTimeout,
    #[error("cache operation timed out")]
    Timeout,
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("cache is closed")]
    Closed,
}

/// Backing store seam. Keys arrive already hashed.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn ping(&self) -> Result<(), CacheError>;
    /// Idempotent.
    async fn close(&self);
}

#[derive(Clone)]
pub struct Cache {
    store: Option<Arc<dyn CacheStore>>,
    ttl: Duration,
}

impl Cache {
    pub fn disabled() -> Self {
        Self {
            store: None,
            ttl: Duration::ZERO,
        }
    }

    /// Wraps an already-initialized store.
    pub fn with_store(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            ttl,
        }
    }

    /// Connects the configured backend and probes it within 2 s.
    pub async fn connect(config: &CacheConfig) -> Result<Self, CacheError> {
        if !config.enabled {
            info!(event = "cache_disabled");
            return Ok(Self::disabled());
        }
        if matches!(config.backend, CacheBackend::Redis) && config.redis.addr.trim().is_empty() {
            return Err(CacheError::MissingAddress);
        }
        let store = tokio::time::timeout(INIT_PROBE_TIMEOUT, open_store(config))
            .await
            .map_err(|_| CacheError::ProbeTimeout)??;
        info!(
            event = "cache_ready",
            backend = ?config.backend,
            ttl_secs = config.ttl.as_secs()
        );
        Ok(Self::with_store(store, config.ttl))
    }

    pub fn enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Hex-encoded SHA-256 of `raw`, always 64 characters.
    pub fn hash(raw: &str) -> String {
        let digest = Sha256::digest(raw.as_bytes());
        let mut out = String::with_capacity(64);
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(None);
        };
        store.get(key).await
    }

    pub async fn set(&self, key: &str, value: Bytes) -> Result<(), CacheError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        store.set(key, value, self.ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let Some(store) = self.store.as_ref() else {
            return Ok(());
        };
        store.delete(key).await
    }

    pub async fn close(&self) {
        if let Some(store) = self.store.as_ref() {
            store.close().await;
        }
    }
}

/// Connect plus liveness probe; the caller bounds both with one deadline.
async fn open_store(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    let store: Arc<dyn CacheStore> = match config.backend {
        CacheBackend::Redis => Arc::new(RedisStore::connect(&config.redis).await?),
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
    };
    store.ping().await?;
    Ok(store)
}
