//! Error types for Turnstile.

use thiserror::Error;

use crate::ratelimit::RequestContext;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Invalid limiter or rule configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request was denied admission by an immediate-reject policy
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(Box<RequestContext>),

    /// The background sweeper task failed
    #[error("Sweeper error: {0}")]
    Sweeper(String),
}

impl TurnstileError {
    /// Returns the rejected request context if this is an admission denial.
    pub fn rejected_context(&self) -> Option<&RequestContext> {
        match self {
            TurnstileError::RateLimitExceeded(ctx) => Some(ctx.as_ref()),
            _ => None,
        }
    }

    /// Whether this error represents an admission denial.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TurnstileError::RateLimitExceeded(_))
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
