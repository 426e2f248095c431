//! Singleflight Module
//!
//! Cache-aside loading where concurrent misses for one key share a single
//! producer run instead of stampeding the backing computation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::error::LoadError;

type LoadResult<V, E> = Result<V, LoadError<E>>;
type SharedLoad<V, E> = Shared<BoxFuture<'static, LoadResult<V, E>>>;
type InflightMap<V, E> = Arc<Mutex<HashMap<String, SharedLoad<V, E>>>>;

// == Singleflight ==
/// Get-or-compute wrapper over a [`Cache`].
///
/// At most one producer runs per key at any instant. Every caller that
/// arrives while it runs awaits the same outcome, success or failure.
/// Failures are handed to the waiters and never stored.
pub struct Singleflight<V, E> {
    cache: Cache<V>,
    inflight: InflightMap<V, E>,
}

impl<V, E> Clone for Singleflight<V, E> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            inflight: Arc::clone(&self.inflight),
        }
    }
}

impl<V, E> fmt::Debug for Singleflight<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Singleflight")
            .field("cache", &self.cache)
            .field("in_flight", &self.inflight.lock().len())
            .finish()
    }
}

impl<V, E> Singleflight<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Wraps `cache`; loads are stored there on success.
    pub fn new(cache: Cache<V>) -> Self {
        Self {
            cache,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The cache this wrapper populates.
    pub fn cache(&self) -> &Cache<V> {
        &self.cache
    }

    /// Number of keys with a producer currently running.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }

    // == Get Or Compute ==
    /// Returns the cached value for `key`, or computes it with `producer`.
    ///
    /// On a miss with no load in flight, `producer` is called exactly once
    /// and its future runs as its own task bounded by the cache's
    /// `producer_timeout`, so it settles even if every caller goes away.
    /// A successful result is stored with `ttl` (or the cache default) and
    /// `tags` before any waiter is released.
    ///
    /// If a load for `key` is already running, `producer` is dropped
    /// uncalled and this call resolves to that load's outcome.
    ///
    /// `producer` is called after the key is registered and with no lock
    /// held, so it may use this wrapper itself.
    pub async fn get_or_compute<F, Fut, I, T>(
        &self,
        key: &str,
        producer: F,
        ttl: Option<Duration>,
        tags: I,
    ) -> LoadResult<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let (load, sender) = {
            let mut inflight = self.inflight.lock();

            // Checked under the in-flight lock: an owner stores its value
            // before deregistering, so a miss here means no finished load
            // can slip between this read and the lookup below.
            if let Some(value) = self.cache.get(key) {
                return Ok(value);
            }

            match inflight.get(key) {
                Some(running) => {
                    debug!(key, "Joining in-flight load");
                    (running.clone(), None)
                }
                None => {
                    let (tx, rx) = oneshot::channel();
                    let load = async move { rx.await.unwrap_or(Err(LoadError::Aborted)) }
                        .boxed()
                        .shared();
                    inflight.insert(key.to_string(), load.clone());
                    (load, Some(tx))
                }
            }
        };

        if let Some(tx) = sender {
            // Created before `producer` runs so a panic there still
            // deregisters the key
            let registration = Registration {
                inflight: Arc::clone(&self.inflight),
                key: key.to_string(),
            };
            let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
            self.spawn_load(registration, tx, producer(), ttl, tags);
        }

        load.await
    }

    /// Runs the producer future as its own task and reports its outcome
    /// through `tx`.
    fn spawn_load<Fut>(
        &self,
        registration: Registration<V, E>,
        tx: oneshot::Sender<LoadResult<V, E>>,
        fut: Fut,
        ttl: Option<Duration>,
        tags: Vec<String>,
    ) where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let cache = self.cache.clone();
        let ttl = ttl.unwrap_or(cache.config().default_ttl);
        let limit = cache.config().producer_timeout;

        debug!(key = %registration.key, cache = %cache.name(), "Starting load");

        // A panic drops `tx` unsent and waiters see `Aborted`
        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(limit, fut).await {
                Ok(Ok(value)) => {
                    cache.set(&registration.key, value.clone(), ttl, tags);
                    Ok(value)
                }
                Ok(Err(err)) => {
                    debug!(key = %registration.key, "Producer failed");
                    Err(LoadError::Producer(Arc::new(err)))
                }
                Err(_) => {
                    warn!(
                        key = %registration.key,
                        timeout_ms = limit.as_millis() as u64,
                        "Producer timed out"
                    );
                    Err(LoadError::Timeout(limit))
                }
            };

            // Deregister before waking waiters so a retry starts fresh
            drop(registration);
            let _ = tx.send(outcome);
        });
    }
}

// == Registration ==
/// Removes the in-flight record for a key when the owning load ends.
struct Registration<V, E> {
    inflight: InflightMap<V, E>,
    key: String,
}

impl<V, E> Drop for Registration<V, E> {
    fn drop(&mut self) {
        self.inflight.lock().remove(&self.key);
    }
}
