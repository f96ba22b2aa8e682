//! TTL LRU - A fixed-capacity, thread-safe in-memory cache
//!
//! Combines least-recently-used eviction with per-entry time-to-live
//! expiration. Expired entries are reaped by a background Tokio task even if
//! nobody reads them again, and `get` never returns a stale value.
//!
//! ```no_run
//! use std::time::Duration;
//! use ttl_lru::TtlLruCache;
//!
//! # #[tokio::main]
//! # async fn main() -> ttl_lru::Result<()> {
//! let cache = TtlLruCache::with_evict(2, Duration::from_secs(30), |key: &String, _: &u32| {
//!     println!("evicted {key}");
//! })?;
//!
//! cache.add("a".to_string(), 1);
//! assert_eq!(cache.get(&"a".to_string()), Some(1));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
mod tasks;

pub use cache::{EvictCallback, TtlLruCache};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
