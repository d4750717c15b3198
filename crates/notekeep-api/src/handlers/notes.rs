//! Note HTTP handlers.
//!
//! Thin adapters from HTTP to `NoteService`; every rule lives in the service.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use notekeep_core::{NewNote, NoteFilter, NotePatch};

use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ListNotesQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    /// Filter by tags (comma-separated, any match)
    pub tags: Option<String>,
    pub is_public: Option<bool>,
    pub is_pinned: Option<bool>,
    #[serde(default)]
    pub show_deleted: bool,
}

impl ListNotesQuery {
    fn filter(&self) -> NoteFilter {
        let tags = self.tags.as_ref().map(|t| {
            t.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        });
        NoteFilter {
            tags: tags.filter(|t| !t.is_empty()),
            is_public: self.is_public,
            is_pinned: self.is_pinned,
            show_deleted: self.show_deleted,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ViewerQuery {
    pub user_id: Option<String>,
}

impl ViewerQuery {
    fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|u| !u.trim().is_empty())
    }
}

pub async fn create_note(
    State(state): State<AppState>,
    Json(body): Json<NewNote>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.service.create(body).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_notes(
    State(state): State<AppState>,
    Query(query): Query<ListNotesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(limit) = query.limit {
        if limit <= 0 {
            return Err(ApiError::BadRequest("limit must be >= 1".into()));
        }
    }
    if let Some(offset) = query.offset {
        if offset < 0 {
            return Err(ApiError::BadRequest("offset must be >= 0".into()));
        }
    }

    let notes = state
        .service
        .list(&query.filter(), query.offset, query.limit)
        .await?;
    Ok(Json(notes))
}

pub async fn recently_viewed(
    State(state): State<AppState>,
    Query(query): Query<ViewerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = query
        .user_id()
        .ok_or_else(|| ApiError::BadRequest("user_id is required".into()))?;
    Ok(Json(state.service.recently_viewed(user_id).await))
}

pub async fn get_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ViewerQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.service.get(id, query.user_id()).await?;
    Ok(Json(note))
}

pub async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<NotePatch>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.service.update(id, body).await?;
    Ok(Json(note))
}

pub async fn soft_delete_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.soft_delete(id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Note soft-deleted successfully"
    })))
}

pub async fn hard_delete_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.hard_delete(id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Note permanently deleted"
    })))
}

pub async fn restore_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state.service.restore(id).await?;
    Ok(Json(note))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_parses_comma_separated_tags() {
        let query = ListNotesQuery {
            tags: Some(" work, ,home ".to_string()),
            is_public: Some(true),
            ..Default::default()
        };
        let filter = query.filter();
        assert_eq!(
            filter.tags,
            Some(vec!["work".to_string(), "home".to_string()])
        );
        assert_eq!(filter.is_public, Some(true));
        assert!(!filter.show_deleted);
    }

    #[test]
    fn test_list_query_empty_tags_means_no_filter() {
        let query = ListNotesQuery {
            tags: Some(",".to_string()),
            ..Default::default()
        };
        assert_eq!(query.filter().tags, None);
    }

    #[test]
    fn test_blank_user_id_is_ignored() {
        let query = ViewerQuery {
            user_id: Some("  ".to_string()),
        };
        assert_eq!(query.user_id(), None);
    }
}
