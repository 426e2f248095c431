//! Shared Cache Handle
//!
//! Thread-safe, cheaply clonable handle to one named [`CacheStore`].

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::cache::{CacheStats, CacheStore};
use crate::clock::{system_clock, SharedClock};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::{spawn_reaper, ReaperHandle, Sweep};

// == Cache ==
/// A named, independently configured cache instance.
///
/// All map and tag-index mutations happen under one mutex, so a reader
/// never observes a key indexed under a tag without its entry (or the
/// reverse). No operation holds the lock across an await point.
pub struct Cache<V> {
    inner: Arc<Inner<V>>,
}

struct Inner<V> {
    name: String,
    config: CacheConfig,
    store: Mutex<CacheStore<V>>,
    /// Owned reaper, aborted on `destroy` or when the last handle drops
    reaper: Mutex<Option<ReaperHandle>>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Cache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> Cache<V> {
    // == Constructors ==
    /// Creates a cache driven by the system clock.
    ///
    /// Fails with [`CacheError::InvalidConfig`](crate::CacheError::InvalidConfig)
    /// if the configuration is unusable.
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Result<Self> {
        Self::with_clock(name, config, system_clock())
    }

    /// Creates a cache reading time from `clock`.
    pub fn with_clock(
        name: impl Into<String>,
        config: CacheConfig,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let store = CacheStore::new(config.max_size, config.default_ttl, clock);

        info!(
            cache = %name,
            max_size = config.max_size,
            default_ttl_ms = config.default_ttl.as_millis() as u64,
            "Cache created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                config,
                store: Mutex::new(store),
                reaper: Mutex::new(None),
            }),
        })
    }

    // == Accessors ==
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    // == Operations ==
    /// Inserts or overwrites `key` with an explicit TTL.
    pub fn set<I, T>(&self, key: &str, value: V, ttl: Duration, tags: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.inner.store.lock().set(key, value, ttl, tags);
    }

    /// Inserts or overwrites `key` using the configured default TTL.
    pub fn set_default<I, T>(&self, key: &str, value: V, tags: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.inner.store.lock().set_default(key, value, tags);
    }

    /// Returns the live value for `key`, `None` on miss.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.store.lock().get(key)
    }

    /// Remaining lifetime of a live entry.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        self.inner.store.lock().ttl_remaining(key)
    }

    /// Removes `key`; returns true if something was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.store.lock().delete(key)
    }

    /// Removes every entry tagged `tag`; returns how many were removed.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        self.inner.store.lock().invalidate_tag(tag)
    }

    pub fn clear(&self) {
        self.inner.store.lock().clear();
    }

    /// Entry count, including stale entries not yet reaped.
    pub fn size(&self) -> usize {
        self.inner.store.lock().len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.store.lock().stats()
    }

    /// Sweeps every expired entry out of the store.
    pub fn purge_expired(&self) -> usize {
        self.inner.store.lock().purge_expired()
    }

    /// Stops the owned reaper and drops all contents.
    pub fn destroy(&self) {
        // Dropping the handle aborts the task
        drop(self.inner.reaper.lock().take());
        self.clear();
        info!(cache = %self.inner.name, "Cache destroyed");
    }

    /// Returns true while the reaper started by [`Cache::start_reaper`] runs.
    pub fn reaper_running(&self) -> bool {
        self.inner
            .reaper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<V: Clone + Send + 'static> Cache<V> {
    /// Starts a reaper sweeping this cache every `cleanup_interval`.
    ///
    /// The reaper only holds a weak reference, so it never keeps the cache
    /// alive. Returns false if one is already running. Must be called from
    /// within a Tokio runtime.
    pub fn start_reaper(&self) -> bool {
        let mut slot = self.inner.reaper.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        let target = WeakCache {
            name: self.inner.name.clone(),
            inner: Arc::downgrade(&self.inner),
        };
        *slot = Some(spawn_reaper(target, self.inner.config.cleanup_interval));
        true
    }
}

/// Sweep target that does not extend the cache's lifetime.
struct WeakCache<V> {
    name: String,
    inner: Weak<Inner<V>>,
}

impl<V: Clone + Send + 'static> Sweep for WeakCache<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn purge_expired(&self) -> usize {
        self.inner
            .upgrade()
            .map_or(0, |inner| inner.store.lock().purge_expired())
    }
}

impl<V: Clone + Send + 'static> Sweep for Cache<V> {
    fn name(&self) -> &str {
        Cache::name(self)
    }

    fn purge_expired(&self) -> usize {
        Cache::purge_expired(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::CacheError;

    const NO_TAGS: [&str; 0] = [];

    fn cache(max_size: usize) -> (Cache<u32>, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        let config = CacheConfig {
            max_size,
            ..CacheConfig::default()
        };
        let cache = Cache::with_clock("test", config, clock.clone()).unwrap();
        (cache, clock)
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = CacheConfig {
            max_size: 0,
            ..CacheConfig::default()
        };
        let result = Cache::<u32>::new("broken", config);
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_clones_share_state() {
        let (cache, _) = cache(10);
        let other = cache.clone();

        cache.set("k", 7, Duration::from_secs(1), NO_TAGS);
        assert_eq!(other.get("k"), Some(7));
        assert_eq!(other.name(), "test");
    }

    #[test]
    fn test_ttl_correctness() {
        let (cache, clock) = cache(10);

        cache.set("k", 1, Duration::from_millis(100), NO_TAGS);
        assert_eq!(cache.get("k"), Some(1));

        clock.advance(Duration::from_millis(150));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_tag_invalidation_isolation() {
        let (cache, _) = cache(10);
        let ttl = Duration::from_secs(60);

        cache.set("p1", 1, ttl, ["products"]);
        cache.set("p2", 2, ttl, ["products"]);
        cache.set("a1", 3, ttl, ["articles"]);

        assert_eq!(cache.invalidate_tag("products"), 2);
        assert_eq!(cache.get("p1"), None);
        assert_eq!(cache.get("p2"), None);
        assert_eq!(cache.get("a1"), Some(3));
    }

    #[test]
    fn test_delete_and_clear_are_idempotent() {
        let (cache, _) = cache(10);
        cache.set_default("a", 1, ["t"]);

        assert!(!cache.delete("missing"));
        cache.clear();
        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_size_bound_under_concurrent_writers() {
        let (cache, _) = cache(16);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("t{t}-k{i}");
                        cache.set(&key, i, Duration::from_secs(60), [format!("t{t}")]);
                        assert!(cache.size() <= 16);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.size(), 16);
        assert!(cache.inner.store.lock().index_is_consistent());
    }

    #[test]
    fn test_destroy_empties_cache() {
        let (cache, _) = cache(10);
        cache.set_default("a", 1, ["t"]);
        cache.destroy();
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.stats().total_entries, 0);
    }

    fn reaped_cache() -> (Cache<u32>, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        let config = CacheConfig {
            cleanup_interval: Duration::from_millis(10),
            ..CacheConfig::default()
        };
        let cache = Cache::with_clock("reaped", config, clock.clone()).unwrap();
        (cache, clock)
    }

    #[tokio::test]
    async fn test_owned_reaper_sweeps_until_destroy() {
        let (cache, clock) = reaped_cache();
        assert!(cache.start_reaper());
        assert!(!cache.start_reaper());

        cache.set("a", 1, Duration::from_millis(5), NO_TAGS);
        clock.advance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.size(), 0);

        cache.destroy();
        assert!(!cache.reaper_running());

        cache.set("b", 1, Duration::from_millis(5), NO_TAGS);
        clock.advance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        // Nothing sweeps a destroyed cache
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test]
    async fn test_reaper_can_restart_after_destroy() {
        let (cache, _) = reaped_cache();
        assert!(cache.start_reaper());
        cache.destroy();

        assert!(cache.start_reaper());
        assert!(cache.reaper_running());
    }
}
