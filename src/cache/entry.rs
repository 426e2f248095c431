//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and tag support.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value, never inspected by the cache
    pub value: V,
    /// When the entry was last written
    pub stored_at: Instant,
    /// Lifetime measured from `stored_at`
    pub ttl: Duration,
    /// Labels used for grouped invalidation
    pub tags: BTreeSet<String>,
    /// Write sequence number, breaks `stored_at` ties during eviction
    pub seq: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry written at `now`.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `now` - Write timestamp
    /// * `ttl` - Time-to-live from `now`
    /// * `tags` - Tags to index the entry under (duplicates collapse)
    /// * `seq` - Store-wide write sequence number
    pub fn new<I, T>(value: V, now: Instant, ttl: Duration, tags: I, seq: u64) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            value,
            stored_at: now,
            ttl,
            tags: tags.into_iter().map(Into::into).collect(),
            seq,
        }
    }

    // == Is Live ==
    /// Checks whether the entry is still live at `now`.
    ///
    /// Live iff `now - stored_at < ttl`: once the TTL has fully elapsed the
    /// entry is expired, including the exact boundary.
    pub fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }

    // == Time To Live ==
    /// Returns the remaining lifetime at `now`, zero once expired.
    pub fn ttl_remaining(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.stored_at))
    }

    /// Returns the instant the entry stops being live.
    pub fn expires_at(&self) -> Instant {
        self.stored_at + self.ttl
    }

    /// Eviction priority: smaller sorts first.
    pub(crate) fn eviction_rank(&self) -> (Instant, u64) {
        (self.stored_at, self.seq)
    }
}
