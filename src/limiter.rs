//! Sliding-window rate limiter.
//!
//! Tracks timestamps of recent outbound calls. A call may proceed while
//! fewer than `max_calls` timestamps fall inside the trailing window.
//! Expired timestamps are pruned lazily on each check.
//!
//! The limiter never waits. A `false` from [`RateLimiter::can_proceed`] is a
//! hard stop that callers surface as
//! [`HuginnError::RateLimited`](crate::HuginnError::RateLimited).
//!
//! # Concurrency
//!
//! Each method takes the window lock briefly, so individual checks and
//! records never lose updates. The check and the record are separate
//! calls, though: `N` callers may all pass `can_proceed` before any of them
//! records, overshooting the limit by at most `N - 1` calls. This slack is
//! accepted in exchange for not holding a lock across network I/O.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};

/// Rate limiter configuration.
///
/// ```rust
/// # use huginn::RateLimitConfig;
/// # use std::time::Duration;
/// let config = RateLimitConfig::new()
///     .max_calls(20)
///     .window(Duration::from_secs(30));
/// assert_eq!(config.max_calls, 20);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Calls permitted per window. Default: 50.
    pub max_calls: usize,
    /// Trailing window length. Default: 60s.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 50,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set calls permitted per window.
    pub fn max_calls(mut self, n: usize) -> Self {
        self.max_calls = n;
        self
    }

    /// Set the window length.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

/// Shared sliding-window limiter. Create once, share via `Arc`.
pub struct RateLimiter {
    config: RateLimitConfig,
    calls: Mutex<VecDeque<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on a custom clock.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            calls: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Prune expired timestamps, then report whether another call fits.
    pub fn can_proceed(&self) -> bool {
        let now = self.clock.now();
        let mut calls = self.lock();
        self.prune(&mut calls, now);
        calls.len() < self.config.max_calls
    }

    /// Record a call at the current instant.
    pub fn record_call(&self) {
        let now = self.clock.now();
        let mut calls = self.lock();
        self.prune(&mut calls, now);
        calls.push_back(now);
    }

    /// Calls currently inside the window.
    pub fn in_window(&self) -> usize {
        let now = self.clock.now();
        let mut calls = self.lock();
        self.prune(&mut calls, now);
        calls.len()
    }

    /// Time until the oldest call leaves the window, when the window is full.
    pub fn retry_after(&self) -> Option<Duration> {
        let now = self.clock.now();
        let mut calls = self.lock();
        self.prune(&mut calls, now);
        if calls.len() < self.config.max_calls {
            return None;
        }
        calls
            .front()
            .map(|oldest| (*oldest + self.config.window).saturating_duration_since(now))
    }

    fn prune(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = calls.front() {
            if now.saturating_duration_since(*oldest) >= self.config.window {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Instant>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
