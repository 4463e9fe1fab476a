//! Token bucket rate limiter.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::limiter::{KeyedState, RateLimiter};
use crate::error::{Result, TurnstileError};

#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Continuously refilling bucket of `capacity` tokens per key.
///
/// The bucket refills at `capacity` tokens per `refill_period` and each
/// admitted request consumes one token, so bursts of up to `capacity`
/// requests are allowed after an idle period.
///
/// Bucket state is never swept: every key ever seen keeps an entry until
/// [`clear`](Self::clear) is called.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    capacity: u32,
    refill_period: Duration,
    clock: Arc<dyn Clock>,
    buckets: KeyedState<BucketState>,
}

impl TokenBucketLimiter {
    /// Create a limiter backed by the system clock.
    ///
    /// # Errors
    /// Returns `TurnstileError::Config` if `capacity` or `refill_period` is zero.
    pub fn new(capacity: u32, refill_period: Duration) -> Result<Self> {
        Self::with_clock(capacity, refill_period, Arc::new(SystemClock::new()))
    }

    /// Create a limiter reading time from `clock`.
    pub fn with_clock(capacity: u32, refill_period: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if capacity == 0 {
            return Err(TurnstileError::Config(
                "token bucket capacity must be greater than 0".to_string(),
            ));
        }
        if refill_period.is_zero() {
            return Err(TurnstileError::Config(
                "token bucket refill period must be greater than 0".to_string(),
            ));
        }

        debug!(
            capacity,
            refill_period_ms = refill_period.as_millis() as u64,
            "Creating token bucket limiter"
        );

        Ok(Self {
            capacity,
            refill_period,
            clock,
            buckets: KeyedState::new(),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    /// Tokens `key` would have right now, without consuming any.
    pub fn available_tokens(&self, key: &str) -> f64 {
        let now = self.clock.now();
        self.buckets
            .peek(key, |state| self.refilled(state, now))
            .unwrap_or(self.capacity as f64)
    }

    /// Drop all per-key state.
    pub fn clear(&self) {
        self.buckets.clear();
    }

    fn refilled(&self, state: &BucketState, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let capacity = self.capacity as f64;
        let added = elapsed.as_secs_f64() * capacity / self.refill_period.as_secs_f64();
        (state.tokens + added).min(capacity)
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn try_acquire(&self, key: &str) -> bool {
        let now = self.clock.now();
        let capacity = self.capacity as f64;

        let (admitted, tokens) = self.buckets.update(
            key,
            || BucketState {
                tokens: capacity,
                last_refill: now,
            },
            |state| {
                let tokens = self.refilled(state, now);
                let admitted = tokens >= 1.0;
                let tokens = if admitted { tokens - 1.0 } else { tokens };
                *state = BucketState {
                    tokens,
                    last_refill: now.max(state.last_refill),
                };
                (admitted, tokens)
            },
        );

        trace!(key, tokens, capacity = self.capacity, admitted, "Token bucket check");
        if !admitted {
            debug!(key, capacity = self.capacity, "Token bucket exhausted");
        }

        admitted
    }

    fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
