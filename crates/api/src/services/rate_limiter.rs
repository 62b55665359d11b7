//! Per-client fixed-window rate limiter.
//!
//! Each client key gets a window that starts at its first request. Within a
//! window the first `capacity` requests are permitted and the rest denied.
//! Once more than `window` has elapsed since the window started, the next
//! request opens a fresh window with a count of one. This is a fixed window,
//! not a sliding log: a client can burst `capacity` requests at the end of
//! one window and `capacity` more right after it resets.
//!
//! The table is owned by whoever constructs the limiter (the application
//! state in production, each test on its own). Idle entries are evicted by
//! [`RateLimiter::sweep`], which [`RateLimiter::spawn_sweeper`] runs
//! periodically until its handle is dropped.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Entries idle for longer than this many windows are evicted.
const IDLE_WINDOWS: u32 = 5;

/// Window length and capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Length of one fixed window.
    pub window: Duration,
    /// Requests permitted per window and key.
    pub capacity: u32,
}

impl RateLimitConfig {
    #[must_use]
    pub const fn new(window: Duration, capacity: u32) -> Self {
        Self { window, capacity }
    }

    /// Idle period after which a key's state is dropped.
    #[must_use]
    pub fn idle_ttl(&self) -> Duration {
        self.window.saturating_mul(IDLE_WINDOWS)
    }
}

impl Default for RateLimitConfig {
    /// 100 requests per 60 seconds.
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 100)
    }
}

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed.
    Permit {
        /// Requests left in the current window.
        remaining: u32,
    },
    /// The client is over its quota until the window resets.
    Deny {
        /// Time until the current window ends.
        retry_after: Duration,
    },
}

impl Decision {
    #[must_use]
    pub const fn is_permitted(&self) -> bool {
        matches!(self, Self::Permit { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    window_start: Instant,
    count: u32,
    last_seen: Instant,
}

/// Fixed-window limiter keyed by client (usually the source address).
///
/// The read-increment-compare sequence for a key runs under that key's
/// shard lock, so concurrent callers never over-admit.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: DashMap<String, WindowState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Record a request from `key` now and decide whether it may proceed.
    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    /// Record a request from `key` at `now` and decide whether it may proceed.
    ///
    /// Denied requests refresh the key's activity but do not count.
    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let capacity = self.config.capacity;

        match self.entries.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(WindowState {
                    window_start: now,
                    count: 1,
                    last_seen: now,
                });
                Decision::Permit {
                    remaining: capacity.saturating_sub(1),
                }
            }
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                state.last_seen = now;
                let elapsed = now.saturating_duration_since(state.window_start);

                if elapsed > self.config.window {
                    state.window_start = now;
                    state.count = 1;
                    Decision::Permit {
                        remaining: capacity.saturating_sub(1),
                    }
                } else if state.count >= capacity {
                    Decision::Deny {
                        retry_after: self.config.window - elapsed,
                    }
                } else {
                    state.count += 1;
                    Decision::Permit {
                        remaining: capacity - state.count,
                    }
                }
            }
        }
    }

    /// Evict keys idle for longer than [`RateLimitConfig::idle_ttl`].
    ///
    /// Returns the number of evicted keys.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// [`Self::sweep`] evaluated at `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let ttl = self.config.idle_ttl();
        let before = self.entries.len();
        self.entries
            .retain(|_, state| now.saturating_duration_since(state.last_seen) <= ttl);
        before.saturating_sub(self.entries.len())
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run [`Self::sweep`] once per window on the current tokio runtime.
    ///
    /// The task stops when the returned handle is dropped or when the
    /// limiter itself is dropped.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let limiter: Weak<Self> = Arc::downgrade(self);
        let period = self.config.window;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let evicted = limiter.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = limiter.len(), "Rate limit sweep");
                }
            }
        });

        SweeperHandle { task }
    }
}

/// Owns the background sweep task; aborts it on drop.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Returns `true` once the sweep task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Whole seconds to advertise in `Retry-After` (at least one).
#[must_use]
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    let secs = if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    };
    secs.max(1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn limiter(window_secs: u64, capacity: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new(
            Duration::from_secs(window_secs),
            capacity,
        ))
    }

    #[test]
    fn test_first_request_always_permits() {
        let limiter = limiter(60, 1);
        let now = Instant::now();
        assert_eq!(
            limiter.check_at("10.0.0.1", now),
            Decision::Permit { remaining: 0 }
        );
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_capacity_then_deny_within_window() {
        let limiter = limiter(60, 100);
        let start = Instant::now();

        for i in 0..100 {
            let at = start + Duration::from_millis(i * 10);
            assert!(limiter.check_at("client", at).is_permitted(), "request {i}");
        }

        let decision = limiter.check_at("client", start + Duration::from_secs(59));
        assert_eq!(
            decision,
            Decision::Deny {
                retry_after: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn test_denied_requests_do_not_count() {
        let limiter = limiter(60, 2);
        let start = Instant::now();
        assert!(limiter.check_at("k", start).is_permitted());
        assert!(limiter.check_at("k", start).is_permitted());
        for _ in 0..10 {
            assert!(!limiter.check_at("k", start).is_permitted());
        }
        // After reset the client gets the full capacity again
        let later = start + Duration::from_secs(61);
        assert_eq!(
            limiter.check_at("k", later),
            Decision::Permit { remaining: 1 }
        );
        assert!(limiter.check_at("k", later).is_permitted());
        assert!(!limiter.check_at("k", later).is_permitted());
    }

    #[test]
    fn test_window_resets_only_after_strictly_more_than_window() {
        let limiter = limiter(60, 1);
        let start = Instant::now();
        assert!(limiter.check_at("k", start).is_permitted());
        assert!(!limiter.check_at("k", start + Duration::from_secs(60)).is_permitted());
        assert!(
            limiter
                .check_at("k", start + Duration::from_secs(60) + Duration::from_millis(1))
                .is_permitted()
        );
    }

    #[test]
    fn test_window_start_does_not_slide() {
        let limiter = limiter(60, 3);
        let start = Instant::now();
        assert!(limiter.check_at("k", start).is_permitted());
        assert!(limiter.check_at("k", start + Duration::from_secs(50)).is_permitted());
        assert!(limiter.check_at("k", start + Duration::from_secs(59)).is_permitted());
        // 61s after the window opened it resets, even though the last
        // request was only 2s ago
        assert_eq!(
            limiter.check_at("k", start + Duration::from_secs(61)),
            Decision::Permit { remaining: 2 }
        );
    }

    #[test]
    fn test_boundary_burst_is_allowed() {
        let limiter = limiter(60, 5);
        let start = Instant::now();
        assert!(limiter.check_at("k", start).is_permitted());

        let end_of_window = start + Duration::from_secs(59);
        for _ in 0..4 {
            assert!(limiter.check_at("k", end_of_window).is_permitted());
        }
        let next_window = start + Duration::from_secs(61);
        for _ in 0..5 {
            assert!(limiter.check_at("k", next_window).is_permitted());
        }
        assert!(!limiter.check_at("k", next_window).is_permitted());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(60, 1);
        let now = Instant::now();
        assert!(limiter.check_at("a", now).is_permitted());
        assert!(!limiter.check_at("a", now).is_permitted());
        assert!(limiter.check_at("b", now).is_permitted());
    }

    #[test]
    fn test_sweep_evicts_only_idle_entries() {
        let limiter = limiter(10, 5);
        let start = Instant::now();
        limiter.check_at("idle", start);
        limiter.check_at("active", start);
        limiter.check_at("active", start + Duration::from_secs(45));

        // idle: 51s > 50s ttl; active: 6s
        assert_eq!(limiter.sweep_at(start + Duration::from_secs(51)), 1);
        assert_eq!(limiter.len(), 1);
        assert!(limiter.check_at("active", start + Duration::from_secs(51)).is_permitted());
    }

    #[test]
    fn test_concurrent_callers_never_over_admit() {
        let limiter = Arc::new(limiter(60, 50));
        let now = Instant::now();

        let permitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let limiter = Arc::clone(&limiter);
                    scope.spawn(move || {
                        (0..25)
                            .filter(|_| limiter.check_at("shared", now).is_permitted())
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(permitted, 50);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn test_sweeper_evicts_in_background_and_stops_on_drop() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(
            Duration::from_millis(20),
            5,
        )));
        let long_ago = Instant::now()
            .checked_sub(Duration::from_secs(5))
            .unwrap_or_else(Instant::now);
        limiter.check_at("stale", long_ago);

        let handle = limiter.spawn_sweeper();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(limiter.is_empty());

        drop(handle);
    }
}
