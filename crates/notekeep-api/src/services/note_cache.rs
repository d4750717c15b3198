//! Cache-aside layer for single notes.
//!
//! Reads consult the key-value backend first and fall back to the note store,
//! populating the cache on the way out. Writes go to the store first and then
//! refresh or invalidate the cached snapshot. Backend failures are logged and
//! never surface to callers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use notekeep_core::defaults::{note_key, NOTE_CACHE_TTL_SECS, RECENT_NOTES_LIMIT};
use notekeep_core::{KeyValueStore, Note, NoteStore, Result};

/// Tunables shared by the cache-aside layer and the recency tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Lifetime of a cached note snapshot.
    pub note_ttl: Duration,
    /// Number of ids kept per recency list.
    pub recent_limit: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            note_ttl: Duration::from_secs(NOTE_CACHE_TTL_SECS),
            recent_limit: RECENT_NOTES_LIMIT,
        }
    }
}

impl CacheSettings {
    /// Read `NOTE_CACHE_TTL` (seconds) and `RECENT_NOTES_LIMIT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let note_ttl = std::env::var("NOTE_CACHE_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.note_ttl);
        let recent_limit = std::env::var("RECENT_NOTES_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.recent_limit);
        Self {
            note_ttl,
            recent_limit,
        }
    }
}

/// Result of consulting the cache for a single note.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// A snapshot was present and decoded.
    Hit(Note),
    /// Nothing usable under the key.
    Miss,
    /// The backend failed or timed out.
    Unavailable(String),
}

/// Cache-aside access to notes.
#[derive(Clone)]
pub struct NoteCache {
    store: Arc<dyn NoteStore>,
    kv: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl NoteCache {
    pub fn new(store: Arc<dyn NoteStore>, kv: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, kv, ttl }
    }

    /// The durable store behind this cache.
    pub fn note_store(&self) -> &Arc<dyn NoteStore> {
        &self.store
    }

    /// The key-value backend behind this cache.
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Consult the cache only.
    pub async fn lookup(&self, id: i64) -> CacheLookup {
        let key = note_key(id);
        match self.kv.get(&key).await {
            Ok(Some(payload)) => match serde_json::from_str::<Note>(&payload) {
                Ok(note) => {
                    debug!(subsystem = "cache", op = "lookup", note_id = id, "Cache hit");
                    CacheLookup::Hit(note)
                }
                Err(e) => {
                    warn!(
                        subsystem = "cache",
                        op = "lookup",
                        note_id = id,
                        error = %e,
                        "Undecodable cached note, treating as miss"
                    );
                    CacheLookup::Miss
                }
            },
            Ok(None) => {
                debug!(subsystem = "cache", op = "lookup", note_id = id, "Cache miss");
                CacheLookup::Miss
            }
            Err(e) => {
                warn!(
                    subsystem = "cache",
                    op = "lookup",
                    note_id = id,
                    error = %e,
                    "Cache read failed, falling back to store"
                );
                CacheLookup::Unavailable(e.to_string())
            }
        }
    }

    /// Fetch an active note, serving from cache when possible.
    ///
    /// Store errors propagate; cache errors never do.
    pub async fn fetch(&self, id: i64) -> Result<Option<Note>> {
        if let CacheLookup::Hit(note) = self.lookup(id).await {
            return Ok(Some(note));
        }

        let start = Instant::now();
        let note = self.store.get(id).await?;
        debug!(
            subsystem = "cache",
            op = "fetch",
            note_id = id,
            found = note.is_some(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Loaded note from store"
        );

        if let Some(note) = &note {
            self.store(note).await;
        }
        Ok(note)
    }

    /// Overwrite the cached snapshot of `note`. Best-effort.
    pub async fn store(&self, note: &Note) {
        let payload = match serde_json::to_string(note) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(note_id = note.id, error = %e, "Failed to encode note for cache");
                return;
            }
        };
        if let Err(e) = self.kv.set_ex(&note_key(note.id), &payload, self.ttl).await {
            warn!(
                subsystem = "cache",
                op = "store",
                note_id = note.id,
                error = %e,
                "Cache write failed"
            );
        }
    }

    /// Drop the cached snapshot of note `id`. Best-effort.
    pub async fn invalidate(&self, id: i64) {
        if let Err(e) = self.kv.delete(&note_key(id)).await {
            warn!(
                subsystem = "cache",
                op = "invalidate",
                note_id = id,
                error = %e,
                "Cache invalidation failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryKvStore;
    use notekeep_core::NewNote;
    use notekeep_db::MemoryNoteStore;

    fn setup() -> (MemoryNoteStore, MemoryKvStore, NoteCache) {
        let store = MemoryNoteStore::new();
        let kv = MemoryKvStore::new();
        let cache = NoteCache::new(
            Arc::new(store.clone()),
            Arc::new(kv.clone()),
            CacheSettings::default().note_ttl,
        );
        (store, kv, cache)
    }

    #[test]
    fn test_default_settings() {
        let settings = CacheSettings::default();
        assert_eq!(settings.note_ttl, Duration::from_secs(1800));
        assert_eq!(settings.recent_limit, 10);
    }

    #[tokio::test]
    async fn test_fetch_populates_cache_then_hits() {
        let (store, kv, cache) = setup();
        let note = store.insert(NewNote::new("T1", "C1")).await.unwrap();
        store.reset_query_count();

        assert_eq!(cache.lookup(note.id).await, CacheLookup::Miss);
        let fetched = cache.fetch(note.id).await.unwrap().unwrap();
        assert_eq!(fetched, note);
        assert_eq!(store.query_count(), 1);
        let ttl = kv.ttl("note:1").await.expect("snapshot should be cached");
        assert!(ttl <= Duration::from_secs(1800) && ttl > Duration::from_secs(1790));

        let again = cache.fetch(note.id).await.unwrap().unwrap();
        assert_eq!(again, note);
        assert_eq!(store.query_count(), 1, "second fetch must be served from cache");
    }

    #[tokio::test]
    async fn test_fetch_absent_note_is_not_cached() {
        let (_store, kv, cache) = setup();
        assert_eq!(cache.fetch(42).await.unwrap(), None);
        assert_eq!(kv.peek("note:42").await, None);
    }

    #[tokio::test]
    async fn test_fetch_survives_unavailable_backend() {
        let (store, kv, cache) = setup();
        let note = store.insert(NewNote::new("T1", "C1")).await.unwrap();
        kv.set_unavailable(true);

        assert!(matches!(
            cache.lookup(note.id).await,
            CacheLookup::Unavailable(_)
        ));
        assert_eq!(cache.fetch(note.id).await.unwrap(), Some(note));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_falls_back_when_backend_hangs() {
        let (store, kv, cache) = setup();
        let note = store.insert(NewNote::new("T1", "C1")).await.unwrap();
        store.reset_query_count();
        kv.set_hanging(true);

        let start = tokio::time::Instant::now();
        assert_eq!(cache.fetch(note.id).await.unwrap(), Some(note));
        assert_eq!(store.query_count(), 1);

        // One bounded read, then one bounded write-back
        let bound = Duration::from_millis(notekeep_core::defaults::CACHE_OP_TIMEOUT_MS);
        assert_eq!(start.elapsed(), bound * 2);
        assert_eq!(kv.peek("note:1").await, None);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss() {
        let (store, kv, cache) = setup();
        let note = store.insert(NewNote::new("T1", "C1")).await.unwrap();
        kv.set_ex("note:1", "not json", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.lookup(note.id).await, CacheLookup::Miss);
        assert_eq!(cache.fetch(note.id).await.unwrap(), Some(note));
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let (store, _kv, cache) = setup();
        store.set_unavailable(true);
        assert!(cache.fetch(1).await.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_removes_snapshot() {
        let (store, kv, cache) = setup();
        let note = store.insert(NewNote::new("T1", "C1")).await.unwrap();
        cache.store(&note).await;
        assert!(kv.peek("note:1").await.is_some());

        cache.invalidate(note.id).await;
        assert!(kv.peek("note:1").await.is_none());
    }
}
