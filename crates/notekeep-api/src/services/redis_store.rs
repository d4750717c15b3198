//! Redis-backed key-value store for note snapshots and recency lists.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `REDIS_ENABLED`: Set to "false" to disable caching (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
//! - `REDIS_TIMEOUT_MS`: Upper bound on each Redis call (default: 250)
//!
//! A disabled or unreachable Redis behaves as an always-empty cache: reads
//! return nothing and writes are dropped, so every read goes to the store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult};
use tracing::{debug, info, warn};

use notekeep_core::defaults::{CACHE_OP_TIMEOUT_MS, REDIS_URL};
use notekeep_core::{Error, KeyValueStore, Result};

/// Key-value store backed by Redis.
#[derive(Clone)]
pub struct RedisStore {
    inner: Arc<RedisStoreInner>,
}

struct RedisStoreInner {
    /// Redis connection manager (None if disabled or unreachable at startup).
    connection: Option<ConnectionManager>,
    /// Upper bound on a single Redis round trip.
    op_timeout: Duration,
    /// Whether caching is enabled.
    enabled: bool,
}

impl RedisStore {
    /// Create a new store from environment configuration.
    ///
    /// Reads:
    /// - `REDIS_ENABLED` (default: true)
    /// - `REDIS_URL` (default: redis://localhost:6379)
    /// - `REDIS_TIMEOUT_MS` (default: 250)
    pub async fn from_env() -> Self {
        let enabled = std::env::var("REDIS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| REDIS_URL.to_string());

        let timeout_ms: u64 = std::env::var("REDIS_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(CACHE_OP_TIMEOUT_MS);

        if !enabled {
            info!("Redis note cache disabled via REDIS_ENABLED=false");
            return Self::disabled();
        }

        Self::connect(&redis_url, Duration::from_millis(timeout_ms)).await
    }

    /// Connect to `redis_url`. Connection failures leave the store disabled.
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> Self {
        let connection = match redis::Client::open(redis_url) {
            Ok(client) => {
                match tokio::time::timeout(
                    op_timeout.max(Duration::from_secs(2)),
                    ConnectionManager::new(client),
                )
                .await
                {
                    Ok(Ok(conn)) => {
                        info!(
                            subsystem = "cache",
                            component = "redis",
                            timeout_ms = op_timeout.as_millis() as u64,
                            "Redis note cache enabled"
                        );
                        Some(conn)
                    }
                    Ok(Err(e)) => {
                        warn!("Failed to connect to Redis, cache disabled: {}", e);
                        None
                    }
                    Err(_) => {
                        warn!("Timed out connecting to Redis, cache disabled");
                        None
                    }
                }
            }
            Err(e) => {
                warn!("Invalid Redis URL, cache disabled: {}", e);
                None
            }
        };

        Self {
            inner: Arc::new(RedisStoreInner {
                enabled: connection.is_some(),
                connection,
                op_timeout,
            }),
        }
    }

    /// Create a disabled store (for testing or when Redis is unavailable).
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(RedisStoreInner {
                connection: None,
                op_timeout: Duration::from_millis(CACHE_OP_TIMEOUT_MS),
                enabled: false,
            }),
        }
    }

    /// Check if caching is enabled and connected.
    pub fn is_connected(&self) -> bool {
        self.inner.enabled && self.inner.connection.is_some()
    }

    /// Per-call timeout.
    pub fn op_timeout(&self) -> Duration {
        self.inner.op_timeout
    }

    /// `ConnectionManager` is a cheap handle over one multiplexed connection.
    fn connection(&self) -> Option<ConnectionManager> {
        self.inner.connection.clone()
    }

    /// Run one Redis command under the configured timeout.
    async fn bounded<T, F>(&self, op: &'static str, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.inner.op_timeout, fut).await {
            Ok(Ok(value)) => {
                debug!(subsystem = "cache", component = "redis", op, key, "Redis call ok");
                Ok(value)
            }
            Ok(Err(e)) => Err(Error::Cache(format!("Redis {} {} failed: {}", op, key, e))),
            Err(_) => Err(Error::Cache(format!(
                "Redis {} {} timed out after {}ms",
                op,
                key,
                self.inner.op_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(mut conn) = self.connection() else {
            return Ok(None);
        };
        self.bounded("GET", key, conn.get::<_, Option<String>>(key))
            .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let Some(mut conn) = self.connection() else {
            return Ok(());
        };
        // Redis rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        self.bounded("SET", key, conn.set_ex::<_, _, ()>(key, value, seconds))
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let Some(mut conn) = self.connection() else {
            return Ok(());
        };
        self.bounded("DEL", key, conn.del::<_, ()>(key)).await
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize> {
        let Some(mut conn) = self.connection() else {
            return Ok(0);
        };
        // count 0 removes every occurrence
        self.bounded("LREM", key, conn.lrem::<_, _, usize>(key, 0, value))
            .await
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize> {
        let Some(mut conn) = self.connection() else {
            return Ok(0);
        };
        self.bounded("LPUSH", key, conn.lpush::<_, _, usize>(key, value))
            .await
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<()> {
        let Some(mut conn) = self.connection() else {
            return Ok(());
        };
        self.bounded("LTRIM", key, conn.ltrim::<_, ()>(key, start, stop))
            .await
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let Some(mut conn) = self.connection() else {
            return Ok(Vec::new());
        };
        self.bounded("LRANGE", key, conn.lrange::<_, Vec<String>>(key, start, stop))
            .await
    }
}
