//! Note lifecycle orchestration.
//!
//! A note is `active`, `soft_deleted` (tombstone) or `absent`. Every
//! mutation goes to the store first; the cache is then refreshed
//! (create, update, restore) or invalidated (soft delete, hard delete).

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use notekeep_core::{
    Error, KeyValueStore, NewNote, Note, NoteFilter, NotePatch, NoteStore, Result,
};

use super::note_cache::{CacheSettings, NoteCache};
use super::recently_viewed::RecentlyViewed;

/// Orchestrates note lifecycle operations over the store and the cache.
#[derive(Clone)]
pub struct NoteService {
    store: Arc<dyn NoteStore>,
    cache: NoteCache,
    recent: RecentlyViewed,
}

impl NoteService {
    pub fn new(
        store: Arc<dyn NoteStore>,
        kv: Arc<dyn KeyValueStore>,
        settings: CacheSettings,
    ) -> Self {
        let cache = NoteCache::new(store.clone(), kv, settings.note_ttl);
        let recent = RecentlyViewed::new(cache.clone(), settings.recent_limit);
        Self {
            store,
            cache,
            recent,
        }
    }

    pub fn cache(&self) -> &NoteCache {
        &self.cache
    }

    /// Create a note. Fails with `Conflict` if an active note has the title.
    pub async fn create(&self, new_note: NewNote) -> Result<Note> {
        new_note.validate()?;

        // Fast path only; the unique index decides races.
        if self
            .store
            .find_active_by_title(&new_note.title)
            .await?
            .is_some()
        {
            warn!(op = "create", title = %new_note.title, "Rejected duplicate title");
            return Err(duplicate_title(&new_note.title));
        }

        let note = self.store.insert(new_note).await?;
        self.cache.store(&note).await;
        info!(op = "create", note_id = note.id, title = %note.title, "Note created");
        Ok(note)
    }

    /// Fetch an active note, recording the view when `viewer` is given.
    pub async fn get(&self, id: i64, viewer: Option<&str>) -> Result<Note> {
        let note = self
            .cache
            .fetch(id)
            .await?
            .ok_or(Error::NoteNotFound(id))?;
        if let Some(user_id) = viewer {
            self.recent.record(user_id, id).await;
        }
        Ok(note)
    }

    /// List notes straight from the store.
    pub async fn list(
        &self,
        filter: &NoteFilter,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Note>> {
        let notes = self.store.list(filter, offset, limit).await?;
        info!(
            op = "list",
            tags = ?filter.tags,
            is_public = ?filter.is_public,
            is_pinned = ?filter.is_pinned,
            show_deleted = filter.show_deleted,
            offset = ?offset,
            limit = ?limit,
            result_count = notes.len(),
            "Listed notes"
        );
        Ok(notes)
    }

    /// Apply a partial update to an active note.
    pub async fn update(&self, id: i64, patch: NotePatch) -> Result<Note> {
        patch.validate()?;

        if let Some(title) = &patch.title {
            if let Some(holder) = self.store.find_active_by_title(title).await? {
                if holder.id != id {
                    warn!(op = "update", note_id = id, title = %title, "Rejected duplicate title");
                    return Err(duplicate_title(title));
                }
            }
        }

        let note = self
            .store
            .update(id, &patch)
            .await?
            .ok_or(Error::NoteNotFound(id))?;
        self.cache.store(&note).await;
        info!(
            op = "update",
            note_id = id,
            fields = ?patch.field_names(),
            "Note updated"
        );
        Ok(note)
    }

    /// Tombstone a note. Already-deleted notes are returned unchanged.
    pub async fn soft_delete(&self, id: i64) -> Result<Note> {
        if let Some(note) = self.store.mark_deleted(id, Utc::now()).await? {
            self.cache.invalidate(id).await;
            info!(op = "soft_delete", note_id = id, "Note soft-deleted");
            return Ok(note);
        }

        // The write was skipped: the note is gone or someone else tombstoned it
        match self.store.get_including_deleted(id).await? {
            Some(current) if current.is_deleted() => {
                self.cache.invalidate(id).await;
                info!(op = "soft_delete", note_id = id, "Note already soft-deleted");
                Ok(current)
            }
            Some(_) => {
                warn!(op = "soft_delete", note_id = id, "Note restored during soft delete");
                Err(Error::Conflict(format!(
                    "Note {} was restored while being deleted",
                    id
                )))
            }
            None => Err(Error::NoteNotFound(id)),
        }
    }

    /// Permanently remove a note, active or tombstoned.
    pub async fn hard_delete(&self, id: i64) -> Result<()> {
        if !self.store.delete(id).await? {
            return Err(Error::NoteNotFound(id));
        }
        self.cache.invalidate(id).await;
        info!(op = "hard_delete", note_id = id, "Note permanently deleted");
        Ok(())
    }

    /// Bring a tombstoned note back.
    pub async fn restore(&self, id: i64) -> Result<Note> {
        let note = self
            .store
            .restore(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Note {} not found or not deleted", id)))?;
        self.cache.store(&note).await;
        info!(op = "restore", note_id = id, "Note restored");
        Ok(note)
    }

    /// The user's recently viewed notes, most recent first.
    pub async fn recently_viewed(&self, user_id: &str) -> Vec<Note> {
        let notes = self.recent.resolve(user_id).await;
        info!(
            op = "recently_viewed",
            user_id,
            result_count = notes.len(),
            "Resolved recently viewed notes"
        );
        notes
    }
}

fn duplicate_title(title: &str) -> Error {
    Error::Conflict(format!("Note with title '{}' already exists", title))
}
