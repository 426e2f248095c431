//! Rate Limiter Module
//!
//! Fixed-window request counting keyed by caller identifier.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{system_clock, SharedClock};
use crate::tasks::Sweep;

/// Expired windows examined per `allow` call.
const SWEEP_BATCH: usize = 8;

/// Longest window a limiter will track; longer requests are clamped.
pub const MAX_WINDOW: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// == Rate Decision ==
/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests allowed per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Time until the current window rolls over
    pub reset_after: Duration,
}

// == Window ==
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    windows: HashMap<String, Window>,
    /// Window deadlines, soonest first, consumed by the incremental sweep
    openings: BinaryHeap<Reverse<(Instant, String)>>,
}

impl State {
    /// Drops up to `budget` windows that have rolled over.
    ///
    /// Queue items whose window was since replaced are dropped without
    /// touching the newer window.
    fn sweep(&mut self, now: Instant, budget: usize) -> usize {
        let mut removed = 0;
        for _ in 0..budget {
            let Some(Reverse((reset_at, _))) = self.openings.peek() else {
                break;
            };
            if *reset_at > now {
                break;
            }
            let Some(Reverse((reset_at, id))) = self.openings.pop() else {
                break;
            };
            let stale = self
                .windows
                .get(&id)
                .is_some_and(|w| w.reset_at == reset_at && w.reset_at <= now);
            if stale {
                self.windows.remove(&id);
                removed += 1;
            }
        }
        removed
    }
}

// == Rate Limiter ==
/// Fixed-window counter: at most `max_requests` per identifier per window.
///
/// A caller timing requests around a window boundary can get up to twice
/// the limit through in a short span; that imprecision is accepted.
pub struct RateLimiter {
    state: Mutex<State>,
    clock: SharedClock,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tracked", &self.tracked())
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    // == Constructors ==
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    // == Allow ==
    /// Counts one request for `identifier` and decides whether it may pass.
    ///
    /// Read, check and increment happen in one critical section, so two
    /// racing requests can never both take the last slot. A denied request
    /// does not advance the count. `max_requests == 0` denies everything.
    ///
    /// Callers must supply a non-empty identifier, substituting their own
    /// fallback when none can be derived. Windows longer than
    /// [`MAX_WINDOW`] are clamped to it.
    pub fn allow(&self, identifier: &str, max_requests: u32, window: Duration) -> RateDecision {
        let now = self.clock.now();
        let window = window.min(MAX_WINDOW);
        let mut state = self.state.lock();
        state.sweep(now, SWEEP_BATCH);

        if max_requests == 0 {
            return RateDecision {
                allowed: false,
                limit: 0,
                remaining: 0,
                reset_after: window,
            };
        }

        if let Some(current) = state.windows.get_mut(identifier) {
            if now < current.reset_at {
                let reset_after = current.reset_at - now;
                if current.count < max_requests {
                    current.count += 1;
                    return RateDecision {
                        allowed: true,
                        limit: max_requests,
                        remaining: max_requests - current.count,
                        reset_after,
                    };
                }
                debug!(identifier, limit = max_requests, "Rate limit exceeded");
                return RateDecision {
                    allowed: false,
                    limit: max_requests,
                    remaining: 0,
                    reset_after,
                };
            }
        }

        // No window yet, or the old one has rolled over
        let Some(reset_at) = now.checked_add(window) else {
            return RateDecision {
                allowed: false,
                limit: max_requests,
                remaining: 0,
                reset_after: window,
            };
        };
        state.windows.insert(
            identifier.to_string(),
            Window { count: 1, reset_at },
        );
        state
            .openings
            .push(Reverse((reset_at, identifier.to_string())));

        RateDecision {
            allowed: true,
            limit: max_requests,
            remaining: max_requests - 1,
            reset_after: window,
        }
    }

    // == Maintenance ==
    /// Removes every window that has rolled over.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let before = state.windows.len();
        state.windows.retain(|_, w| w.reset_at > now);
        state.openings.retain(|Reverse((reset_at, _))| *reset_at > now);
        before - state.windows.len()
    }

    /// Number of identifiers with a window on record.
    pub fn tracked(&self) -> usize {
        self.state.lock().windows.len()
    }

    /// Forgets every window.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.windows.clear();
        state.openings.clear();
    }
}

impl Sweep for RateLimiter {
    fn name(&self) -> &str {
        "rate_limiter"
    }

    fn purge_expired(&self) -> usize {
        RateLimiter::purge_expired(self)
    }
}
