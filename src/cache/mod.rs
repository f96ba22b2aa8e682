//! Cache Module
//!
//! Provides a bounded in-memory cache with LRU eviction and TTL expiration.

mod entry;
mod lru;
mod store;
mod timer;


// Re-export public types
pub use entry::CacheEntry;
pub use lru::{LruList, NodeId};
pub use store::{EvictCallback, TtlLruCache};
pub use timer::{deadline_after, ExpiryQueue, ExpiryTimer};

pub(crate) use store::Shared;
