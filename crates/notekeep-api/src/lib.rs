//! # notekeep-api
//!
//! Cache-aside note services shared by the HTTP binary and its tests.

pub mod services;

pub use services::{
    CacheLookup, CacheSettings, MemoryKvStore, NoteCache, NoteService, RecentlyViewed, RedisStore,
};
