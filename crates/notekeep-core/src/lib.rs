//! # notekeep-core
//!
//! Core types, traits, and abstractions for notekeep.
//!
//! This crate provides the note model, the error taxonomy, and the two
//! storage seams (`NoteStore` for the durable store, `KeyValueStore` for the
//! cache backend) that the other notekeep crates implement and compose.

pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
