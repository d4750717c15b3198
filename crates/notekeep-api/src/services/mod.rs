//! Caching and lifecycle services.

pub mod memory_kv;
pub mod note_cache;
pub mod note_service;
pub mod recently_viewed;
pub mod redis_store;

pub use memory_kv::MemoryKvStore;
pub use note_cache::{CacheLookup, CacheSettings, NoteCache};
pub use note_service::NoteService;
pub use recently_viewed::RecentlyViewed;
pub use redis_store::RedisStore;
