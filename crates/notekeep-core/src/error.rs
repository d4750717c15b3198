//! Error types for notekeep.

use thiserror::Error;

/// Result type alias using notekeep's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for notekeep operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(i64),

    /// An active note already holds the requested title
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Key-value backend failed or timed out
    #[error("Cache error: {0}")]
    Cache(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Convert a database error into `Conflict` when it is a unique-constraint
    /// violation, leaving every other error as `Database`.
    pub fn on_unique_violation(err: sqlx::Error, conflict: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Error::Conflict(conflict.into())
            }
            _ => Error::Database(err),
        }
    }

    /// True for errors that mean "no such note in the requested state".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::NoteNotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
