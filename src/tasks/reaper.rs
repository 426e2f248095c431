//! Reaper Task
//!
//! Background task that periodically sweeps expired state out of a cache or
//! rate limiter, so keys nobody reads again still release their memory.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Sweep;

// == Reaper Handle ==
/// Owns a running reaper task.
///
/// The task stops on [`ReaperHandle::stop`] or when the handle is dropped,
/// so a reaper never outlives whoever started it.
#[derive(Debug)]
pub struct ReaperHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl ReaperHandle {
    /// Name of the swept target.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the task and waits for it to wind down.
    pub async fn stop(mut self) {
        self.handle.abort();
        let _ = (&mut self.handle).await;
        info!(target_name = %self.name, "Reaper stopped");
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a background task that calls `target.purge_expired()` every
/// `interval`.
///
/// Each pass holds the target's lock for a single table scan and never
/// across the sleep, so readers and writers interleave freely with it.
///
/// # Example
/// ```ignore
/// let cache = Cache::<String>::new("api", CacheConfig::default())?;
/// let reaper = spawn_reaper(cache.clone(), Duration::from_secs(60));
/// // Later, during shutdown:
/// reaper.stop().await;
/// ```
pub fn spawn_reaper<S: Sweep>(target: S, interval: Duration) -> ReaperHandle {
    let name = target.name().to_string();

    let handle = tokio::spawn(async move {
        info!(
            target_name = %target.name(),
            interval_ms = interval.as_millis() as u64,
            "Starting reaper"
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            let removed = target.purge_expired();

            if removed > 0 {
                info!(target_name = %target.name(), removed, "Reaper removed expired items");
            } else {
                debug!(target_name = %target.name(), "Reaper found nothing to remove");
            }
        }
    });

    ReaperHandle { name, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const NO_TAGS: [&str; 0] = [];

    fn cache() -> (Cache<String>, Arc<ManualClock>) {
        let clock = ManualClock::shared();
        let cache = Cache::with_clock("reaped", CacheConfig::default(), clock.clone()).unwrap();
        (cache, clock)
    }

    #[tokio::test]
    async fn test_reaper_removes_expired_entries() {
        let (cache, clock) = cache();

        cache.set("expire_soon", "value".to_string(), Duration::from_secs(1), ["t"]);
        cache.set("long_lived", "value".to_string(), Duration::from_secs(3600), NO_TAGS);
        clock.advance(Duration::from_secs(2));

        let reaper = spawn_reaper(cache.clone(), Duration::from_millis(20));

        // Never read the expired key; only the reaper can remove it
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.size(), 1);
        assert_eq!(cache.stats().expirations, 1);
        assert_eq!(cache.get("long_lived").as_deref(), Some("value"));

        reaper.stop().await;
    }

    #[tokio::test]
    async fn test_reaper_can_be_stopped() {
        let (cache, _) = cache();

        let reaper = spawn_reaper(cache, Duration::from_millis(10));
        assert_eq!(reaper.name(), "reaped");
        assert!(!reaper.is_finished());

        reaper.stop().await;
    }

    #[derive(Clone, Default)]
    struct CountingSweep(Arc<AtomicUsize>);

    impl Sweep for CountingSweep {
        fn name(&self) -> &str {
            "counting"
        }

        fn purge_expired(&self) -> usize {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_sweeps() {
        let sweep = CountingSweep::default();

        let reaper = spawn_reaper(sweep.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        drop(reaper);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = sweep.0.load(Ordering::SeqCst);
        assert!(after_drop > 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sweep.0.load(Ordering::SeqCst), after_drop);
    }
}
