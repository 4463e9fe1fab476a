//! Rate limiting algorithms, rules, rejection policies and gated execution.

mod clock;
mod context;
mod executor;
mod fixed_window;
mod handler;
mod limiter;
mod rules;
mod sweeper;
mod token_bucket;

pub use clock::{Clock, MockClock, SystemClock};
pub use context::{RequestContext, RequestContextBuilder};
pub use executor::RateLimitExecutor;
pub use fixed_window::FixedWindowLimiter;
pub use handler::{DefaultValueHandler, ImmediateRejectHandler, RejectedHandler};
pub use limiter::RateLimiter;
pub use rules::{IpRule, RateLimitRule, ResourceRule, UserLevelRule};
pub use sweeper::{sweep, Sweeper};
pub use token_bucket::TokenBucketLimiter;
