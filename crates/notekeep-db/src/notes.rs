//! Note store implementation over PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use notekeep_core::{Error, NewNote, Note, NoteFilter, NotePatch, NoteStore, Result};

/// Columns selected for every note query, in `map_row_to_note` order.
const NOTE_COLUMNS: &str =
    "id, title, content, tags, is_public, is_pinned, created_at, updated_at, deleted_at";

/// PostgreSQL implementation of NoteStore.
#[derive(Clone)]
pub struct PgNoteStore {
    pool: Pool<Postgres>,
}

impl PgNoteStore {
    /// Create a new PgNoteStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

// =============================================================================
// HELPER FUNCTIONS FOR QUERY BUILDING
// =============================================================================

/// Map a database row to a Note.
fn map_row_to_note(row: &PgRow) -> Result<Note> {
    let tags: Option<Json<Vec<String>>> = row.try_get("tags")?;
    Ok(Note {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        tags: tags.map(|t| t.0),
        is_public: row.try_get("is_public")?,
        is_pinned: row.try_get("is_pinned")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Build the WHERE clause and pagination for a list query.
///
/// Parameters are numbered in bind order: tags, is_public, is_pinned,
/// limit, offset.
fn build_list_query(filter: &NoteFilter, has_limit: bool, has_offset: bool) -> String {
    let mut query = format!("SELECT {} FROM notes n WHERE TRUE ", NOTE_COLUMNS);
    let mut param_idx = 1;

    if filter.tags.as_ref().is_some_and(|t| !t.is_empty()) {
        // JSONB ?| matches when any of the array's strings is a top-level element
        query.push_str(&format!("AND n.tags ?| ${}::text[] ", param_idx));
        param_idx += 1;
    }
    if filter.is_public.is_some() {
        query.push_str(&format!("AND n.is_public = ${} ", param_idx));
        param_idx += 1;
    }
    if filter.is_pinned.is_some() {
        query.push_str(&format!("AND n.is_pinned = ${} ", param_idx));
        param_idx += 1;
    }
    if !filter.show_deleted {
        query.push_str("AND n.deleted_at IS NULL ");
    }

    query.push_str("ORDER BY n.id ASC");

    if has_limit {
        query.push_str(&format!(" LIMIT ${}", param_idx));
        param_idx += 1;
    }
    if has_offset {
        query.push_str(&format!(" OFFSET ${}", param_idx));
    }
    query
}

/// Build the SET list for a partial update.
///
/// `$1` is `updated_at` and `$2` is the note id; patch fields follow.
fn build_update_query(patch: &NotePatch) -> String {
    let mut updates: Vec<String> = vec!["updated_at = $1".to_string()];
    let mut param_idx = 3;

    for (column, present) in [
        ("title", patch.title.is_some()),
        ("content", patch.content.is_some()),
        ("tags", patch.tags.is_some()),
        ("is_public", patch.is_public.is_some()),
        ("is_pinned", patch.is_pinned.is_some()),
    ] {
        if present {
            updates.push(format!("{} = ${}", column, param_idx));
            param_idx += 1;
        }
    }

    format!(
        "UPDATE notes SET {} WHERE id = $2 AND deleted_at IS NULL RETURNING {}",
        updates.join(", "),
        NOTE_COLUMNS
    )
}

#[async_trait]
impl NoteStore for PgNoteStore {
    async fn get(&self, id: i64) -> Result<Option<Note>> {
        let sql = format!(
            "SELECT {} FROM notes WHERE id = $1 AND deleted_at IS NULL",
            NOTE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(map_row_to_note).transpose()
    }

    async fn get_including_deleted(&self, id: i64) -> Result<Option<Note>> {
        let sql = format!("SELECT {} FROM notes WHERE id = $1", NOTE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(map_row_to_note).transpose()
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Note>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM notes WHERE id = ANY($1) AND deleted_at IS NULL",
            NOTE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(map_row_to_note).collect()
    }

    async fn list(
        &self,
        filter: &NoteFilter,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Note>> {
        let sql = build_list_query(filter, limit.is_some(), offset.is_some());
        debug!(subsystem = "database", component = "notes", op = "list", sql = %sql);

        let mut q = sqlx::query(&sql);
        if let Some(tags) = filter.tags.as_ref().filter(|t| !t.is_empty()) {
            q = q.bind(tags.as_slice());
        }
        if let Some(is_public) = filter.is_public {
            q = q.bind(is_public);
        }
        if let Some(is_pinned) = filter.is_pinned {
            q = q.bind(is_pinned);
        }
        if let Some(limit) = limit {
            q = q.bind(limit);
        }
        if let Some(offset) = offset {
            q = q.bind(offset);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        rows.iter().map(map_row_to_note).collect()
    }

    async fn find_active_by_title(&self, title: &str) -> Result<Option<Note>> {
        let sql = format!(
            "SELECT {} FROM notes WHERE title = $1 AND deleted_at IS NULL",
            NOTE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(title)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(map_row_to_note).transpose()
    }

    async fn insert(&self, note: NewNote) -> Result<Note> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO notes (title, content, tags, is_public, is_pinned, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             RETURNING {}",
            NOTE_COLUMNS
        );

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let row = sqlx::query(&sql)
            .bind(&note.title)
            .bind(&note.content)
            .bind(note.tags.clone().map(Json))
            .bind(note.is_public)
            .bind(note.is_pinned)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                Error::on_unique_violation(
                    e,
                    format!("Note with title '{}' already exists", note.title),
                )
            })?;
        let inserted = map_row_to_note(&row)?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(inserted)
    }

    async fn update(&self, id: i64, patch: &NotePatch) -> Result<Option<Note>> {
        let sql = build_update_query(patch);

        let mut q = sqlx::query(&sql).bind(Utc::now()).bind(id);
        if let Some(title) = &patch.title {
            q = q.bind(title);
        }
        if let Some(content) = &patch.content {
            q = q.bind(content);
        }
        if let Some(tags) = &patch.tags {
            q = q.bind(tags.clone().map(Json));
        }
        if let Some(is_public) = patch.is_public {
            q = q.bind(is_public);
        }
        if let Some(is_pinned) = patch.is_pinned {
            q = q.bind(is_pinned);
        }

        let row = q.fetch_optional(&self.pool).await.map_err(|e| {
            Error::on_unique_violation(
                e,
                format!(
                    "Note with title '{}' already exists",
                    patch.title.as_deref().unwrap_or_default()
                ),
            )
        })?;
        row.as_ref().map(map_row_to_note).transpose()
    }

    async fn mark_deleted(&self, id: i64, deleted_at: DateTime<Utc>) -> Result<Option<Note>> {
        let sql = format!(
            "UPDATE notes SET deleted_at = $1, updated_at = $1 \
             WHERE id = $2 AND deleted_at IS NULL RETURNING {}",
            NOTE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(deleted_at)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(map_row_to_note).transpose()
    }

    async fn restore(&self, id: i64) -> Result<Option<Note>> {
        let sql = format!(
            "UPDATE notes SET deleted_at = NULL, updated_at = $1 \
             WHERE id = $2 AND deleted_at IS NOT NULL RETURNING {}",
            NOTE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::on_unique_violation(
                    e,
                    format!("An active note already uses the title of note {}", id),
                )
            })?;
        row.as_ref().map(map_row_to_note).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_without_filters_hides_tombstones() {
        let sql = build_list_query(&NoteFilter::default(), false, false);
        assert!(sql.contains("n.deleted_at IS NULL"));
        assert!(!sql.contains("LIMIT"));
        assert!(!sql.contains("OFFSET"));
        assert!(!sql.contains('$'));
    }

    #[test]
    fn list_query_numbers_params_in_bind_order() {
        let filter = NoteFilter {
            tags: Some(vec!["art".to_string()]),
            is_public: Some(true),
            is_pinned: Some(false),
            show_deleted: true,
        };
        let sql = build_list_query(&filter, true, true);
        assert!(sql.contains("n.tags ?| $1::text[]"));
        assert!(sql.contains("n.is_public = $2"));
        assert!(sql.contains("n.is_pinned = $3"));
        assert!(sql.ends_with("LIMIT $4 OFFSET $5"));
        assert!(!sql.contains("deleted_at IS NULL"));
    }

    #[test]
    fn list_query_skips_empty_tag_filter() {
        let filter = NoteFilter {
            tags: Some(vec![]),
            ..Default::default()
        };
        let sql = build_list_query(&filter, false, true);
        assert!(!sql.contains("?|"));
        assert!(sql.ends_with("OFFSET $1"));
    }

    #[test]
    fn update_query_only_sets_patched_columns() {
        let patch = NotePatch {
            content: Some("new".to_string()),
            is_pinned: Some(true),
            ..Default::default()
        };
        let sql = build_update_query(&patch);
        assert!(sql.starts_with("UPDATE notes SET updated_at = $1, content = $3, is_pinned = $4"));
        assert!(sql.contains("WHERE id = $2 AND deleted_at IS NULL"));
        assert!(!sql.contains("title ="));
    }
}
