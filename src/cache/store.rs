//! Cache Store Module
//!
//! Single-threaded cache engine: entry map, tag index, expiry and eviction.
//! Thread-safe access goes through [`Cache`](super::Cache).

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, TagIndex};
use crate::clock::SharedClock;

// == Cache Store ==
/// Bounded key/value table with per-entry TTL and tag invalidation.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Tag to keys secondary index
    tags: TagIndex,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_size: usize,
    /// TTL used by `set_default`
    default_ttl: Duration,
    /// Monotonic write counter
    next_seq: u64,
    clock: SharedClock,
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    /// Creates a new CacheStore with specified capacity and default TTL.
    ///
    /// `max_size` is assumed to be validated by the caller; a zero bound
    /// is clamped to one so the size invariant still holds.
    pub fn new(max_size: usize, default_ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: HashMap::new(),
            tags: TagIndex::new(),
            stats: CacheStats::new(),
            max_size: max_size.max(1),
            default_ttl,
            next_seq: 0,
            clock,
        }
    }

    // == Set ==
    /// Stores a value under `key`, replacing any previous entry.
    ///
    /// The write refreshes `stored_at`, so a rewritten key moves to the
    /// back of the eviction order. If the key is new and the store is
    /// full, the entry with the oldest `stored_at` is evicted first.
    pub fn set<I, T>(&mut self, key: &str, value: V, ttl: Duration, tags: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let now = self.clock.now();

        if self.remove_entry(key).is_none() && self.entries.len() >= self.max_size {
            self.evict_oldest();
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = CacheEntry::new(value, now, ttl, tags, seq);
        self.tags.index(key, &entry.tags);
        self.entries.insert(key.to_string(), entry);

        self.stats.set_total_entries(self.entries.len());
    }

    /// Stores a value using the store's default TTL.
    pub fn set_default<I, T>(&mut self, key: &str, value: V, tags: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let ttl = self.default_ttl;
        self.set(key, value, ttl, tags);
    }

    // == Get ==
    /// Retrieves a live value by key.
    ///
    /// A stale entry is removed on the spot and reported as a miss.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let now = self.clock.now();

        match self.entries.get(key) {
            Some(entry) if entry.is_live(now) => {
                let value = entry.value.clone();
                self.stats.record_hit();
                Some(value)
            }
            Some(_) => {
                self.remove_entry(key);
                self.stats.record_expirations(1);
                self.stats.record_miss();
                self.stats.set_total_entries(self.entries.len());
                None
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == TTL Remaining ==
    /// Remaining lifetime of a live entry, `None` on miss.
    pub fn ttl_remaining(&mut self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if entry.is_live(now) {
            Some(entry.ttl_remaining(now))
        } else {
            self.remove_entry(key);
            self.stats.record_expirations(1);
            self.stats.set_total_entries(self.entries.len());
            None
        }
    }

    // == Delete ==
    /// Removes an entry by key. Deleting a missing key is a no-op.
    ///
    /// Returns true if an entry was removed.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.remove_entry(key).is_some();
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    // == Invalidate Tag ==
    /// Removes every entry indexed under `tag`.
    ///
    /// Each removed entry is also scrubbed from the other tags it carried.
    /// Returns the number of entries removed.
    pub fn invalidate_tag(&mut self, tag: &str) -> usize {
        let keys = self.tags.take(tag);
        let mut removed = 0;

        for key in &keys {
            if let Some(entry) = self.entries.remove(key) {
                self.tags.unindex(key, &entry.tags);
                removed += 1;
            }
        }

        self.stats.record_invalidations(removed);
        self.stats.set_total_entries(self.entries.len());
        debug!(tag, removed, "Invalidated tag");
        removed
    }

    // == Clear ==
    /// Empties the store and the tag index.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tags.clear();
        self.stats.set_total_entries(0);
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();

        for key in expired_keys {
            self.remove_entry(&key);
        }

        self.stats.record_expirations(count);
        self.stats.set_total_entries(self.entries.len());
        count
    }

    // == Length ==
    /// Returns the number of stored entries, live or not yet reaped.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured entry bound.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// TTL applied by `set_default`.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Number of distinct tags currently indexed.
    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Returns true if `key` is indexed under `tag`.
    pub fn is_tagged(&self, key: &str, tag: &str) -> bool {
        self.tags.contains(tag, key)
    }

    // == Internal Helpers ==
    /// Removes an entry and scrubs it from the tag index.
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.tags.unindex(key, &entry.tags);
        Some(entry)
    }

    /// Evicts the entry with the smallest `(stored_at, seq)`.
    ///
    /// Linear scan; fine for the small bounds these caches run with.
    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.eviction_rank())
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            self.remove_entry(&key);
            self.stats.record_eviction();
            debug!(key = %key, "Evicted oldest entry");
        }
    }

    /// Checks that the entry map and the tag index agree in both directions.
    #[cfg(test)]
    pub(crate) fn index_is_consistent(&self) -> bool {
        let forward = self.entries.iter().all(|(key, entry)| {
            entry.tags.iter().all(|tag| self.tags.contains(tag, key))
        });
        let backward = self.tags.iter().all(|(tag, keys)| {
            keys.iter().all(|key| {
                self.entries
                    .get(key)
                    .is_some_and(|entry| entry.tags.contains(tag))
            })
        });
        forward && backward
    }
}
