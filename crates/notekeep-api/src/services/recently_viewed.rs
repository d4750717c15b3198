//! Per-user recently-viewed notes.
//!
//! Each user has a bounded, duplicate-free list of note ids at
//! `recent_notes:<user_id>`, most recent first. Resolution reads through the
//! note cache and batches every miss into a single store query.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use notekeep_core::defaults::recent_key;
use notekeep_core::Note;

use super::note_cache::{CacheLookup, NoteCache};

/// Recency tracker over the note cache's key-value backend.
#[derive(Clone)]
pub struct RecentlyViewed {
    cache: NoteCache,
    limit: usize,
}

impl RecentlyViewed {
    pub fn new(cache: NoteCache, limit: usize) -> Self {
        Self {
            cache,
            limit: limit.max(1),
        }
    }

    /// Move `note_id` to the front of the user's list. Best-effort.
    ///
    /// The id is not checked against the store; ids that no longer resolve
    /// are dropped at read time.
    pub async fn record(&self, user_id: &str, note_id: i64) {
        let kv = self.cache.backend();
        let key = recent_key(user_id);
        let value = note_id.to_string();

        match kv.list_remove(&key, &value).await {
            Ok(removed) => debug!(
                subsystem = "recent",
                op = "lrem",
                user_id,
                note_id,
                removed,
                "Removed previous occurrences"
            ),
            Err(e) => warn!(
                subsystem = "recent",
                op = "lrem",
                user_id,
                note_id,
                error = %e,
                "Failed to remove previous occurrences"
            ),
        }

        match kv.list_push_front(&key, &value).await {
            Ok(len) => debug!(
                subsystem = "recent",
                op = "lpush",
                user_id,
                note_id,
                len,
                "Pushed view"
            ),
            Err(e) => error!(
                subsystem = "recent",
                op = "lpush",
                user_id,
                note_id,
                error = %e,
                "Failed to record view"
            ),
        }

        let stop = self.limit as isize - 1;
        if let Err(e) = kv.list_trim(&key, 0, stop).await {
            error!(
                subsystem = "recent",
                op = "ltrim",
                user_id,
                error = %e,
                "Failed to trim recency list"
            );
        }
    }

    /// The user's recently viewed notes, most recent first.
    ///
    /// Ids that no longer resolve to an active note are skipped.
    pub async fn resolve(&self, user_id: &str) -> Vec<Note> {
        let key = recent_key(user_id);
        let entries = match self.cache.backend().list_range(&key, 0, -1).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    subsystem = "recent",
                    op = "lrange",
                    user_id,
                    error = %e,
                    "Failed to read recency list, treating as empty"
                );
                return Vec::new();
            }
        };

        let ids: Vec<i64> = entries
            .iter()
            .filter_map(|entry| match entry.parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(
                        subsystem = "recent",
                        user_id,
                        entry = %entry,
                        "Skipping malformed recency entry"
                    );
                    None
                }
            })
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }

        let mut resolved: HashMap<i64, Note> = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for &id in &ids {
            match self.cache.lookup(id).await {
                CacheLookup::Hit(note) => {
                    resolved.insert(id, note);
                }
                CacheLookup::Miss | CacheLookup::Unavailable(_) => missing.push(id),
            }
        }

        debug!(
            subsystem = "recent",
            user_id,
            cached = resolved.len(),
            missing = missing.len(),
            "Resolved recency list from cache"
        );

        if !missing.is_empty() {
            match self.cache.note_store().get_many(&missing).await {
                Ok(notes) => {
                    for note in notes {
                        self.cache.store(&note).await;
                        resolved.insert(note.id, note);
                    }
                }
                Err(e) => error!(
                    subsystem = "recent",
                    user_id,
                    missing = missing.len(),
                    error = %e,
                    "Batched store lookup failed, returning cached notes only"
                ),
            }
        }

        ids.iter().filter_map(|id| resolved.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CacheSettings, MemoryKvStore};
    use chrono::Utc;
    use notekeep_core::{KeyValueStore, NewNote, NoteStore};
    use notekeep_db::MemoryNoteStore;
    use std::sync::Arc;

    fn setup() -> (MemoryNoteStore, MemoryKvStore, RecentlyViewed) {
        let store = MemoryNoteStore::new();
        let kv = MemoryKvStore::new();
        let settings = CacheSettings::default();
        let cache = NoteCache::new(
            Arc::new(store.clone()),
            Arc::new(kv.clone()),
            settings.note_ttl,
        );
        (store, kv, RecentlyViewed::new(cache, settings.recent_limit))
    }

    async fn seed(store: &MemoryNoteStore, count: usize) -> Vec<Note> {
        let mut notes = Vec::new();
        for i in 0..count {
            notes.push(
                store
                    .insert(NewNote::new(format!("T{}", i), "C"))
                    .await
                    .unwrap(),
            );
        }
        notes
    }

    fn ids(notes: &[Note]) -> Vec<i64> {
        notes.iter().map(|n| n.id).collect()
    }

    #[tokio::test]
    async fn test_repeat_view_moves_to_front() {
        let (store, kv, recent) = setup();
        let notes = seed(&store, 3).await;
        let (a, b, c) = (notes[0].id, notes[1].id, notes[2].id);

        for id in [a, b, a, c] {
            recent.record("u1", id).await;
        }

        assert_eq!(
            kv.peek_list("recent_notes:u1").await,
            [c, a, b].map(|id| id.to_string())
        );
        assert_eq!(ids(&recent.resolve("u1").await), vec![c, a, b]);
    }

    #[tokio::test]
    async fn test_list_is_bounded_to_limit() {
        let (store, kv, recent) = setup();
        let notes = seed(&store, 11).await;
        for note in &notes {
            recent.record("u1", note.id).await;
        }

        assert_eq!(kv.peek_list("recent_notes:u1").await.len(), 10);
        let resolved = recent.resolve("u1").await;
        let expected: Vec<i64> = notes.iter().rev().take(10).map(|n| n.id).collect();
        assert_eq!(ids(&resolved), expected);
    }

    #[tokio::test]
    async fn test_unknown_user_skips_store() {
        let (store, _kv, recent) = setup();
        store.reset_query_count();
        assert!(recent.resolve("nobody").await.is_empty());
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn test_misses_are_batched_and_written_back() {
        let (store, kv, recent) = setup();
        let notes = seed(&store, 3).await;
        for note in &notes {
            recent.record("u1", note.id).await;
        }
        store.reset_query_count();

        let resolved = recent.resolve("u1").await;
        assert_eq!(resolved.len(), 3);
        assert_eq!(store.query_count(), 1, "misses must be fetched in one batch");
        for note in &notes {
            assert!(kv.peek(&format!("note:{}", note.id)).await.is_some());
        }

        store.reset_query_count();
        recent.resolve("u1").await;
        assert_eq!(store.query_count(), 0, "second resolve is served from cache");
    }

    #[tokio::test]
    async fn test_dangling_and_malformed_entries_are_skipped() {
        let (store, kv, recent) = setup();
        let notes = seed(&store, 2).await;
        recent.record("u1", notes[0].id).await;
        recent.record("u1", 999).await;
        kv.list_push_front("recent_notes:u1", "garbage").await.unwrap();
        recent.record("u1", notes[1].id).await;

        store.mark_deleted(notes[0].id, Utc::now()).await.unwrap();

        assert_eq!(ids(&recent.resolve("u1").await), vec![notes[1].id]);
    }

    #[tokio::test]
    async fn test_store_failure_returns_cached_subset() {
        let (store, _kv, recent) = setup();
        let notes = seed(&store, 2).await;
        recent.record("u1", notes[0].id).await;
        recent.record("u1", notes[1].id).await;
        // Warm only the first note
        recent.cache.fetch(notes[0].id).await.unwrap();

        store.set_unavailable(true);
        assert_eq!(ids(&recent.resolve("u1").await), vec![notes[0].id]);
    }

    #[tokio::test]
    async fn test_record_swallows_backend_failure() {
        let (_store, kv, recent) = setup();
        kv.set_unavailable(true);
        recent.record("u1", 1).await;
        assert!(recent.resolve("u1").await.is_empty());
        assert_eq!(kv.call_count(), 4);
    }
}
