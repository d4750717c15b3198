//! Database connection pool management.

use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use notekeep_core::{Error, Result};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default time to wait for a free connection, in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Pool configuration options.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a request waits for a free connection before failing.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl PoolConfig {
    /// Create a pool configuration from environment variables.
    ///
    /// Reads:
    /// - `DB_MAX_CONNECTIONS` (default: 10)
    /// - `DB_MIN_CONNECTIONS` (default: 1, capped at the maximum)
    /// - `DB_ACQUIRE_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let max_connections = lookup("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(defaults.max_connections);
        let min_connections = lookup("DB_MIN_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.min_connections)
            .min(max_connections);
        let acquire_timeout = lookup("DB_ACQUIRE_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.acquire_timeout);

        Self {
            max_connections,
            min_connections,
            acquire_timeout,
            ..defaults
        }
    }
}

/// Snapshot of pool occupancy, reported by the health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

impl PoolStats {
    /// True when every open connection is checked out.
    pub fn saturated(&self) -> bool {
        self.idle == 0 && self.size > 0
    }
}

/// Create a new PostgreSQL connection pool with default configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Create a new PostgreSQL connection pool with custom configuration.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    info!(
        subsystem = "database",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Creating database connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Log and return current pool occupancy.
pub fn log_pool_metrics(pool: &PgPool) -> PoolStats {
    let stats = PoolStats {
        size: pool.size(),
        idle: pool.num_idle(),
    };

    debug!(
        subsystem = "database",
        component = "pool",
        op = "metrics",
        pool_size = stats.size,
        pool_idle = stats.idle,
        "Pool health check"
    );

    if stats.saturated() {
        warn!(
            subsystem = "database",
            component = "pool",
            pool_size = stats.size,
            "Connection pool has no idle connections, requests may queue"
        );
    }
    stats
}
