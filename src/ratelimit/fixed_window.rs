//! Fixed window rate limiter.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::limiter::{KeyedState, RateLimiter};
use crate::error::{Result, TurnstileError};

/// Counter state for one key. Replaced wholesale on every admitted request.
#[derive(Debug, Clone, Copy)]
struct WindowState {
    /// When the current window started
    window_start: Instant,
    /// Requests admitted in the current window
    count: u32,
}

/// Admits at most `limit` requests per key in each window.
///
/// A key's window starts at the first request seen after the previous window
/// has fully elapsed. Idle keys stay in memory until [`purge_expired`] runs,
/// usually from a [`Sweeper`](super::Sweeper).
///
/// [`purge_expired`]: RateLimiter::purge_expired
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: KeyedState<WindowState>,
}

impl FixedWindowLimiter {
    /// Create a limiter backed by the system clock.
    ///
    /// # Errors
    /// Returns `TurnstileError::Config` if `limit` or `window` is zero.
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        Self::with_clock(limit, window, Arc::new(SystemClock::new()))
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if limit == 0 {
            return Err(TurnstileError::Config(
                "fixed window limit must be greater than 0".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(TurnstileError::Config(
                "fixed window size must be greater than 0".to_string(),
            ));
        }

        debug!(limit, window_ms = window.as_millis() as u64, "Creating fixed window limiter");

        Ok(Self {
            limit,
            window,
            clock,
            windows: KeyedState::new(),
        })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Remaining quota for `key` in its current window.
    pub fn remaining(&self, key: &str) -> u32 {
        let now = self.clock.now();
        self.windows
            .peek(key, |state| {
                if self.is_expired(state, now) {
                    self.limit
                } else {
                    self.limit.saturating_sub(state.count)
                }
            })
            .unwrap_or(self.limit)
    }

    /// Time until `key`'s current window closes, or `None` if the key has no
    /// open window.
    pub fn duration_until_reset(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.windows
            .peek(key, |state| {
                let elapsed = now.saturating_duration_since(state.window_start);
                self.window.checked_sub(elapsed)
            })
            .flatten()
    }

    /// Drop all per-key state.
    pub fn clear(&self) {
        self.windows.clear();
    }

    fn is_expired(&self, state: &WindowState, now: Instant) -> bool {
        now.saturating_duration_since(state.window_start) > self.window
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn try_acquire(&self, key: &str) -> bool {
        let now = self.clock.now();

        let (admitted, count) = self.windows.update(
            key,
            || WindowState {
                window_start: now,
                count: 0,
            },
            |state| {
                if self.is_expired(state, now) {
                    *state = WindowState {
                        window_start: now,
                        count: 1,
                    };
                    (true, 1)
                } else if state.count < self.limit {
                    *state = WindowState {
                        window_start: state.window_start,
                        count: state.count + 1,
                    };
                    (true, state.count)
                } else {
                    (false, state.count)
                }
            },
        );

        trace!(key, count, limit = self.limit, admitted, "Fixed window check");
        if !admitted {
            debug!(key, limit = self.limit, "Fixed window limit exceeded");
        }

        admitted
    }

    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.windows.retain(|state| !self.is_expired(state, now))
    }
}
