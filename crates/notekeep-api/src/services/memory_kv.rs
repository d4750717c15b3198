//! In-process key-value store with Redis list semantics.
//!
//! Used by tests and by deployments that run without Redis. Expiry is
//! tracked with `tokio::time::Instant` so paused-clock tests can advance it.
//! A hanging store stalls each call for the same bound `RedisStore` applies
//! and then fails it as timed out.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use notekeep_core::defaults::CACHE_OP_TIMEOUT_MS;
use notekeep_core::{Error, KeyValueStore, Result};

#[derive(Default)]
struct Inner {
    strings: HashMap<String, (String, Instant)>,
    lists: HashMap<String, VecDeque<String>>,
}

impl Inner {
    fn live_string(&mut self, key: &str) -> Option<&(String, Instant)> {
        let expired = matches!(self.strings.get(key), Some((_, at)) if *at <= Instant::now());
        if expired {
            self.strings.remove(key);
        }
        self.strings.get(key)
    }
}

/// Key-value store held in process memory.
#[derive(Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<Mutex<Inner>>,
    unavailable: Arc<AtomicBool>,
    hanging: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the backend timed out.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every subsequent call stall until the per-call timeout elapses.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Number of calls received, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Remaining lifetime of a string key, if it exists.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut inner = self.inner.lock().await;
        inner
            .live_string(key)
            .map(|(_, at)| at.saturating_duration_since(Instant::now()))
    }

    /// Read a string key without counting the call.
    pub async fn peek(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().await;
        inner.live_string(key).map(|(v, _)| v.clone())
    }

    /// Read a list without counting the call.
    pub async fn peek_list(&self, key: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .lists
            .get(key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn check(&self, op: &str, key: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Cache(format!("{} {} failed: backend unavailable", op, key)));
        }
        if self.hanging.load(Ordering::SeqCst) {
            let bound = Duration::from_millis(CACHE_OP_TIMEOUT_MS);
            if tokio::time::timeout(bound, std::future::pending::<()>())
                .await
                .is_err()
            {
                return Err(Error::Cache(format!(
                    "{} {} timed out after {}ms",
                    op,
                    key,
                    bound.as_millis()
                )));
            }
        }
        Ok(())
    }
}

/// Resolve Redis-style inclusive indexes against a list of `len` elements.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check("GET", key).await?;
        let mut inner = self.inner.lock().await;
        Ok(inner.live_string(key).map(|(v, _)| v.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check("SET", key).await?;
        let mut inner = self.inner.lock().await;
        inner
            .strings
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check("DEL", key).await?;
        let mut inner = self.inner.lock().await;
        inner.strings.remove(key);
        inner.lists.remove(key);
        Ok(())
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize> {
        self.check("LREM", key).await?;
        let mut inner = self.inner.lock().await;
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|v| v != value);
        Ok(before - list.len())
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize> {
        self.check("LPUSH", key).await?;
        let mut inner = self.inner.lock().await;
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        Ok(list.len())
    }

    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<()> {
        self.check("LTRIM", key).await?;
        let mut inner = self.inner.lock().await;
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(());
        };
        match resolve_range(list.len(), start, stop) {
            Some((from, to)) => {
                list.truncate(to + 1);
                list.drain(..from);
            }
            None => list.clear(),
        }
        if list.is_empty() {
            inner.lists.remove(key);
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        self.check("LRANGE", key).await?;
        let inner = self.inner.lock().await;
        let Some(list) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }
}
