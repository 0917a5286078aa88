use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn full(rate: u32, now: Instant) -> Self {
        Self {
            tokens: rate,
            last_refill: now,
            last_seen: now,
        }
    }
}

/// Token bucket per caller. A bucket starts full with `rate` tokens and
/// regains `rate` tokens for every whole `window` elapsed since its last
/// refill, never exceeding `rate`.
///
/// The map sits behind a read/write lock and each bucket behind its own
/// mutex, so callers with different keys only share the read lock.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Mutex<Bucket>>>>,
    rate: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(rate: u32, window: Duration) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            rate: rate.max(1),
            window: if window.is_zero() {
                Duration::from_secs(1)
            } else {
                window
            },
        }
    }

    async fn bucket(&self, key: &str, now: Instant) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self.buckets.read().await.get(key) {
            return bucket.clone();
        }
        self.buckets
            .write()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::full(self.rate, now))))
            .clone()
    }

    /// Takes one token for `key`, or reports how long until the next refill.
    pub async fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let bucket = self.bucket(key, now).await;
        let mut bucket = match bucket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        bucket.last_seen = now;

        let elapsed = now.duration_since(bucket.last_refill);
        let windows = elapsed.as_nanos() / self.window.as_nanos();
        if windows > 0 {
            let refill = u32::try_from(windows.saturating_mul(u128::from(self.rate)))
                .unwrap_or(u32::MAX);
            bucket.tokens = bucket.tokens.saturating_add(refill).min(self.rate);
            bucket.last_refill = now;
        }

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            return Ok(());
        }
        Err(self.window.saturating_sub(now.duration_since(bucket.last_refill)))
    }

    /// Drops buckets not checked for two windows or more; returns how many.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle = self.window * 2;
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| {
            let last_seen = match bucket.lock() {
                Ok(guard) => guard.last_seen,
                Err(poisoned) => poisoned.into_inner().last_seen,
            };
            now.duration_since(last_seen) < idle
        });
        before - buckets.len()
    }

    pub async fn tracked(&self) -> usize {
        self.buckets.read().await.len()
    }

    /// Sweeps every ten windows until the limiter is dropped by all owners
    /// but the task itself.
    pub fn spawn_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let period = self.window * 10;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if Arc::strong_count(&self) == 1 {
                    break;
                }
                let evicted = self.sweep().await;
                if evicted > 0 {
                    debug!(event = "rate_limit_sweep", evicted);
                }
            }
        })
    }
}

/// Keys on the `Authorization` header when present, else the peer address.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let key = caller_key(&req);
    match limiter.check(&key).await {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            let retry_after = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            info!(event = "rate_limited", path = %req.uri().path(), retry_after);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                Json(serde_json::json!({
                    "error": "rate limit exceeded",
                    "retry_after": retry_after,
                })),
            )
                .into_response()
        }
    }
}

fn caller_key(req: &Request) -> String {
    if let Some(value) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return value.to_string();
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
