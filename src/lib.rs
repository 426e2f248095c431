//! tagcache - in-process caching and request admission
//!
//! A bounded TTL cache with tag invalidation, a singleflight get-or-compute
//! wrapper that collapses concurrent misses, and a fixed-window rate limiter.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod ratelimit;
pub mod singleflight;
pub mod tasks;

pub use api::AppState;
pub use cache::{Cache, CacheStats};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CacheConfig, Config, RateLimitConfig};
pub use error::{CacheError, LoadError};
pub use ratelimit::{RateDecision, RateLimiter};
pub use singleflight::Singleflight;
pub use tasks::{spawn_reaper, ReaperHandle, Sweep};
