//! Cache Module
//!
//! In-memory caching with TTL expiration, oldest-write eviction and tag invalidation.

mod entry;
mod handle;
mod stats;
mod store;
mod tags;


// Re-export public types
pub use entry::CacheEntry;
pub use handle::Cache;
pub use stats::CacheStats;
pub use store::CacheStore;
pub use tags::TagIndex;
