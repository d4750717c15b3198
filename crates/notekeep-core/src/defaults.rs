//! Centralized default constants for notekeep.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic numbers.

// =============================================================================
// NOTE LIMITS
// =============================================================================

/// Maximum title length in characters.
pub const TITLE_MAX_CHARS: usize = 100;

/// Maximum content length in characters.
pub const CONTENT_MAX_CHARS: usize = 5000;

/// Maximum length of a single tag in characters.
pub const TAG_MAX_CHARS: usize = 30;

// =============================================================================
// CACHE
// =============================================================================

/// Time-to-live for cached note snapshots, in seconds.
pub const NOTE_CACHE_TTL_SECS: u64 = 1800;

/// Upper bound on any single key-value backend call, in milliseconds.
pub const CACHE_OP_TIMEOUT_MS: u64 = 250;

/// Key prefix for cached note snapshots (`note:<id>`).
pub const NOTE_KEY_PREFIX: &str = "note:";

/// Key prefix for per-user recency lists (`recent_notes:<user_id>`).
pub const RECENT_KEY_PREFIX: &str = "recent_notes:";

/// Number of note ids retained per recency list.
pub const RECENT_NOTES_LIMIT: usize = 10;

/// Default Redis URL.
pub const REDIS_URL: &str = "redis://localhost:6379";

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Default rate limit: max requests per period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Default rate limit: period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 600;

/// Default database URL.
pub const DATABASE_URL: &str = "postgres://localhost/notekeep";

/// Build the cache key for a note snapshot.
pub fn note_key(id: i64) -> String {
    format!("{}{}", NOTE_KEY_PREFIX, id)
}

/// Build the cache key for a user's recency list.
pub fn recent_key(user_id: &str) -> String {
    format!("{}{}", RECENT_KEY_PREFIX, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_keys_use_expected_prefixes() {
        assert_eq!(note_key(7), "note:7");
        assert_eq!(recent_key("u1"), "recent_notes:u1");
    }

    #[test]
    fn recency_limit_is_positive() {
        const {
            assert!(RECENT_NOTES_LIMIT > 0);
            assert!(CACHE_OP_TIMEOUT_MS < NOTE_CACHE_TTL_SECS * 1000);
        }
    }
}
