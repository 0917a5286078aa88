use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use tracing::info;

use super::{CacheError, CacheStore};
use crate::config::RedisConfig;

/// Shared Redis connection; the manager reconnects on its own and is cheap to
/// clone per command.
pub struct RedisStore {
    conn: ArcSwapOption<ConnectionManager>,
}

impl RedisStore {
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(connection_url(config))?;
        let manager = ConnectionManager::new(client).await?;
        info!(event = "redis_connected", addr = %config.addr.trim(), db = config.db);
        Ok(Self {
            conn: ArcSwapOption::from(Some(Arc::new(manager))),
        })
    }

    fn connection(&self) -> Result<ConnectionManager, CacheError> {
        self.conn
            .load()
            .as_deref()
            .cloned()
            .ok_or(CacheError::Closed)
    }
}

fn connection_url(config: &RedisConfig) -> String {
    let auth = if config.password.is_empty() {
        String::new()
    } else {
        format!(":{}@", urlencoding::encode(&config.password))
    };
    format!("redis://{auth}{}/{}", config.addr.trim(), config.db)
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.connection()?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.conn.swap(None).is_some() {
            info!(event = "redis_closed");
        }
    }
}
