//! Data models for notekeep.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::defaults::{CONTENT_MAX_CHARS, TAG_MAX_CHARS, TITLE_MAX_CHARS};
use crate::error::{Error, Result};

// =============================================================================
// NOTE TYPES
// =============================================================================

/// A stored note.
///
/// This is also the snapshot serialized into the cache under `note:<id>`,
/// so every field must round-trip through JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    pub is_public: bool,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the note is soft-deleted (a tombstone).
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Note {
    /// True if the note is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Request for creating a new note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    #[serde(default, alias = "tag")]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_pinned: bool,
}

impl NewNote {
    /// Convenience constructor for a private, unpinned, untagged note.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Set the tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Mark the note public.
    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    /// Mark the note pinned.
    pub fn pinned(mut self) -> Self {
        self.is_pinned = true;
        self
    }

    /// Check field limits.
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_content(&self.content)?;
        if let Some(tags) = &self.tags {
            validate_tags(tags)?;
        }
        Ok(())
    }
}

/// Partial update for a note.
///
/// `None` leaves a field unchanged. For `tags`, `Some(None)` clears the tag
/// list while `Some(Some(vec![]))` sets it to an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(
        default,
        alias = "tag",
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub tags: Option<Option<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,
}

impl NotePatch {
    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.tags.is_none()
            && self.is_public.is_none()
            && self.is_pinned.is_none()
    }

    /// Check field limits on the fields that are set.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidInput("update contains no fields".to_string()));
        }
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(content) = &self.content {
            validate_content(content)?;
        }
        if let Some(Some(tags)) = &self.tags {
            validate_tags(tags)?;
        }
        Ok(())
    }

    /// Names of the fields this patch sets, in declaration order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.title.is_some() {
            names.push("title");
        }
        if self.content.is_some() {
            names.push("content");
        }
        if self.tags.is_some() {
            names.push("tags");
        }
        if self.is_public.is_some() {
            names.push("is_public");
        }
        if self.is_pinned.is_some() {
            names.push("is_pinned");
        }
        names
    }

    /// Apply the set fields to `note` and stamp `updated_at`.
    pub fn apply_to(&self, note: &mut Note, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            note.title = title.clone();
        }
        if let Some(content) = &self.content {
            note.content = content.clone();
        }
        if let Some(tags) = &self.tags {
            note.tags = tags.clone();
        }
        if let Some(is_public) = self.is_public {
            note.is_public = is_public;
        }
        if let Some(is_pinned) = self.is_pinned {
            note.is_pinned = is_pinned;
        }
        note.updated_at = now;
    }
}

/// Filters for listing notes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteFilter {
    /// Match notes carrying at least one of these tags.
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
    pub is_pinned: Option<bool>,
    /// Include soft-deleted notes.
    pub show_deleted: bool,
}

impl NoteFilter {
    /// Evaluate the filter against a single note.
    pub fn matches(&self, note: &Note) -> bool {
        if !self.show_deleted && note.is_deleted() {
            return false;
        }
        if let Some(is_public) = self.is_public {
            if note.is_public != is_public {
                return false;
            }
        }
        if let Some(is_pinned) = self.is_pinned {
            if note.is_pinned != is_pinned {
                return false;
            }
        }
        match &self.tags {
            Some(wanted) if !wanted.is_empty() => note
                .tags
                .as_deref()
                .unwrap_or_default()
                .iter()
                .any(|t| wanted.contains(t)),
            _ => true,
        }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn validate_title(title: &str) -> Result<()> {
    let len = title.chars().count();
    if len == 0 || len > TITLE_MAX_CHARS {
        return Err(Error::InvalidInput(format!(
            "title must be 1-{} characters (got {})",
            TITLE_MAX_CHARS, len
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<()> {
    let len = content.chars().count();
    if len == 0 || len > CONTENT_MAX_CHARS {
        return Err(Error::InvalidInput(format!(
            "content must be 1-{} characters (got {})",
            CONTENT_MAX_CHARS, len
        )));
    }
    Ok(())
}

fn validate_tags(tags: &[String]) -> Result<()> {
    if let Some(tag) = tags.iter().find(|t| t.chars().count() > TAG_MAX_CHARS) {
        return Err(Error::InvalidInput(format!(
            "each tag must be at most {} characters long: '{}'",
            TAG_MAX_CHARS, tag
        )));
    }
    Ok(())
}

/// Deserialize a present field (including an explicit `null`) as `Some(_)`.
///
/// Paired with `#[serde(default)]` so a missing field stays `None`.
fn deserialize_some<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}
