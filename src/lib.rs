//! Turnstile - In-Process Admission Control
//!
//! This crate gates arbitrary work behind per-key rate limiters. A
//! [`RateLimitRule`](ratelimit::RateLimitRule) maps each request context to a
//! limiter and key, and a [`RejectedHandler`](ratelimit::RejectedHandler)
//! decides what a denied caller gets back. All state is process-local.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod simulate;

pub use config::{LimiterConfig, TurnstileConfig};
pub use error::{Result, TurnstileError};
pub use ratelimit::{
    DefaultValueHandler, FixedWindowLimiter, ImmediateRejectHandler, IpRule, RateLimitExecutor,
    RateLimitRule, RateLimiter, RejectedHandler, RequestContext, ResourceRule, Sweeper,
    TokenBucketLimiter, UserLevelRule,
};
