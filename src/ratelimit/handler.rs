//! Policies applied to rejected requests.

use super::context::RequestContext;
use crate::error::{Result, TurnstileError};

/// What to produce when a rule denies a request.
pub trait RejectedHandler<T>: Send + Sync {
    /// Handle a rejected request in place of the guarded operation.
    fn on_rejected(&self, ctx: &RequestContext) -> Result<T>;
}

/// Answers every rejected request with a fixed fallback value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultValueHandler<T> {
    fallback: T,
}

impl<T> DefaultValueHandler<T> {
    pub fn new(fallback: T) -> Self {
        Self { fallback }
    }

    pub fn fallback(&self) -> &T {
        &self.fallback
    }
}

impl<T: Clone + Send + Sync> RejectedHandler<T> for DefaultValueHandler<T> {
    fn on_rejected(&self, _ctx: &RequestContext) -> Result<T> {
        Ok(self.fallback.clone())
    }
}

/// Fails every rejected request with [`TurnstileError::RateLimitExceeded`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateRejectHandler;

impl ImmediateRejectHandler {
    pub fn new() -> Self {
        Self
    }
}

impl<T> RejectedHandler<T> for ImmediateRejectHandler {
    fn on_rejected(&self, ctx: &RequestContext) -> Result<T> {
        Err(TurnstileError::RateLimitExceeded(Box::new(ctx.clone())))
    }
}
