//! In-process note store.
//!
//! Mirrors the PostgreSQL store's semantics, including the partial unique
//! index on active titles, so services can be exercised without a database.
//! Always compiled so integration tests in other crates can use it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use notekeep_core::{Error, NewNote, Note, NoteFilter, NotePatch, NoteStore, Result};

#[derive(Default)]
struct Inner {
    next_id: i64,
    notes: BTreeMap<i64, Note>,
}

impl Inner {
    /// True if an active note other than `except` holds `title`.
    fn title_taken(&self, title: &str, except: Option<i64>) -> bool {
        self.notes
            .values()
            .any(|n| n.deleted_at.is_none() && n.title == title && Some(n.id) != except)
    }
}

/// Note store backed by a `BTreeMap`, ordered by ID.
#[derive(Clone, Default)]
pub struct MemoryNoteStore {
    inner: Arc<RwLock<Inner>>,
    unavailable: Arc<AtomicBool>,
    queries: Arc<AtomicUsize>,
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of calls served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Reset the call counter.
    pub fn reset_query_count(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    /// Overwrite a stored note directly, bypassing `updated_at` stamping.
    ///
    /// Lets tests simulate writes that never reached the cache.
    pub async fn put_raw(&self, note: Note) {
        let mut inner = self.inner.write().await;
        inner.next_id = inner.next_id.max(note.id);
        inner.notes.insert(note.id, note);
    }

    fn check(&self) -> Result<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn get(&self, id: i64) -> Result<Option<Note>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner.notes.get(&id).filter(|n| !n.is_deleted()).cloned())
    }

    async fn get_including_deleted(&self, id: i64) -> Result<Option<Note>> {
        self.check()?;
        Ok(self.inner.read().await.notes.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Note>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .notes
            .values()
            .filter(|n| !n.is_deleted() && ids.contains(&n.id))
            .cloned()
            .collect())
    }

    async fn list(
        &self,
        filter: &NoteFilter,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Note>> {
        self.check()?;
        let inner = self.inner.read().await;
        let offset = offset.unwrap_or(0).max(0) as usize;
        let limit = limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(inner
            .notes
            .values()
            .filter(|n| filter.matches(n))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_active_by_title(&self, title: &str) -> Result<Option<Note>> {
        self.check()?;
        let inner = self.inner.read().await;
        Ok(inner
            .notes
            .values()
            .find(|n| !n.is_deleted() && n.title == title)
            .cloned())
    }

    async fn insert(&self, note: NewNote) -> Result<Note> {
        self.check()?;
        let mut inner = self.inner.write().await;
        if inner.title_taken(&note.title, None) {
            return Err(Error::Conflict(format!(
                "Note with title '{}' already exists",
                note.title
            )));
        }
        inner.next_id += 1;
        let now = Utc::now();
        let stored = Note {
            id: inner.next_id,
            title: note.title,
            content: note.content,
            tags: note.tags,
            is_public: note.is_public,
            is_pinned: note.is_pinned,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        inner.notes.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: i64, patch: &NotePatch) -> Result<Option<Note>> {
        self.check()?;
        let mut inner = self.inner.write().await;
        if let Some(title) = &patch.title {
            if inner.title_taken(title, Some(id)) {
                return Err(Error::Conflict(format!(
                    "Note with title '{}' already exists",
                    title
                )));
            }
        }
        match inner.notes.get_mut(&id) {
            Some(note) if !note.is_deleted() => {
                patch.apply_to(note, Utc::now());
                Ok(Some(note.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_deleted(&self, id: i64, deleted_at: DateTime<Utc>) -> Result<Option<Note>> {
        self.check()?;
        let mut inner = self.inner.write().await;
        match inner.notes.get_mut(&id) {
            Some(note) if !note.is_deleted() => {
                note.deleted_at = Some(deleted_at);
                note.updated_at = deleted_at;
                Ok(Some(note.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn restore(&self, id: i64) -> Result<Option<Note>> {
        self.check()?;
        let mut inner = self.inner.write().await;
        let title = match inner.notes.get(&id) {
            Some(note) if note.is_deleted() => note.title.clone(),
            _ => return Ok(None),
        };
        if inner.title_taken(&title, Some(id)) {
            return Err(Error::Conflict(format!(
                "An active note already uses the title of note {}",
                id
            )));
        }
        let note = match inner.notes.get_mut(&id) {
            Some(note) => note,
            None => return Ok(None),
        };
        note.deleted_at = None;
        note.updated_at = Utc::now();
        Ok(Some(note.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.check()?;
        Ok(self.inner.write().await.notes.remove(&id).is_some())
    }
}
