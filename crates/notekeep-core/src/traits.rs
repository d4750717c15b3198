//! Core traits for notekeep abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::Result;
use crate::models::{NewNote, Note, NoteFilter, NotePatch};

// =============================================================================
// NOTE STORE
// =============================================================================

/// Durable storage for notes. The store is always the source of truth.
///
/// Lookups exclude soft-deleted notes unless the method says otherwise.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Fetch an active note by ID.
    async fn get(&self, id: i64) -> Result<Option<Note>>;

    /// Fetch a note by ID whether or not it is soft-deleted.
    async fn get_including_deleted(&self, id: i64) -> Result<Option<Note>>;

    /// Fetch every active note among `ids` in one query. Order is unspecified.
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Note>>;

    /// List notes matching `filter`, ordered by ID.
    async fn list(
        &self,
        filter: &NoteFilter,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Note>>;

    /// Find the active note holding `title`, if any.
    async fn find_active_by_title(&self, title: &str) -> Result<Option<Note>>;

    /// Insert a new note and return it with its assigned ID.
    ///
    /// Returns `Error::Conflict` if an active note already has the title.
    async fn insert(&self, note: NewNote) -> Result<Note>;

    /// Apply a partial update to an active note.
    ///
    /// Returns `None` if the note is absent or soft-deleted.
    async fn update(&self, id: i64, patch: &NotePatch) -> Result<Option<Note>>;

    /// Tombstone an active note at `deleted_at`, stamping `updated_at`.
    ///
    /// The write only applies while the note is active. Returns `None` if the
    /// note is absent or already soft-deleted, leaving it untouched.
    async fn mark_deleted(&self, id: i64, deleted_at: DateTime<Utc>) -> Result<Option<Note>>;

    /// Clear the tombstone of a soft-deleted note, stamping `updated_at`.
    ///
    /// Returns `None` if the note is absent or already active. Returns
    /// `Error::Conflict` if another active note now holds its title.
    async fn restore(&self, id: i64) -> Result<Option<Note>>;

    /// Permanently remove a note. Returns false if it did not exist.
    async fn delete(&self, id: i64) -> Result<bool>;
}

// =============================================================================
// KEY-VALUE BACKEND
// =============================================================================

/// Key-value backend used for note snapshots and recency lists.
///
/// Every method may fail with `Error::Cache`; callers treat such failures as
/// a cache miss or a no-op and never surface them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value with an expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove every occurrence of `value` from the list at `key`.
    /// Returns the number of elements removed.
    async fn list_remove(&self, key: &str, value: &str) -> Result<usize>;

    /// Prepend `value` to the list at `key`. Returns the new list length.
    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize>;

    /// Keep only the elements between `start` and `stop` inclusive.
    async fn list_trim(&self, key: &str, start: isize, stop: isize) -> Result<()>;

    /// Read the elements between `start` and `stop` inclusive.
    /// Negative indexes count from the end, as in Redis.
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;
}
