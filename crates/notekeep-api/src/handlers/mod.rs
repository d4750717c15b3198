//! HTTP handlers for notekeep-api.

pub mod notes;

pub use notes::{
    create_note, get_note, hard_delete_note, list_notes, recently_viewed, restore_note,
    soft_delete_note, update_note,
};
