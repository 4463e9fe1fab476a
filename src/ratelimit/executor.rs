//! Gated execution of caller-supplied work.

use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::context::RequestContext;
use super::handler::RejectedHandler;
use super::rules::RateLimitRule;
use crate::error::{Result, TurnstileError};

/// Runs an operation only if the rule admits the request, and defers to the
/// rejection handler otherwise.
///
/// The executor keeps no state of its own. Rule state lives in the rule's
/// limiters, so several executors may share one rule through its `Arc`.
pub struct RateLimitExecutor<T, R: ?Sized, H> {
    rule: Arc<R>,
    handler: H,
    _output: PhantomData<fn() -> T>,
}

impl<T, R, H> RateLimitExecutor<T, R, H>
where
    R: RateLimitRule + ?Sized,
    H: RejectedHandler<T>,
{
    pub fn new(rule: Arc<R>, handler: H) -> Self {
        Self {
            rule,
            handler,
            _output: PhantomData,
        }
    }

    pub fn rule(&self) -> &Arc<R> {
        &self.rule
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Run `op` if admitted, otherwise return the handler's result.
    pub fn execute<F>(&self, ctx: &RequestContext, op: F) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        if self.admit(ctx) {
            Ok(op())
        } else {
            self.handler.on_rejected(ctx)
        }
    }

    /// Run `op(value)` if admitted. On rejection `value` is dropped and the
    /// handler's value, if any, is discarded.
    pub fn execute_with<F>(&self, ctx: &RequestContext, op: F, value: T) -> Result<()>
    where
        F: FnOnce(T),
    {
        if self.admit(ctx) {
            op(value);
            Ok(())
        } else {
            self.handler.on_rejected(ctx).map(|_| ())
        }
    }

    /// Run a fallible `op` if admitted. Handler errors are converted into the
    /// operation's error type.
    pub fn try_execute<F, E>(&self, ctx: &RequestContext, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<TurnstileError>,
    {
        if self.admit(ctx) {
            op()
        } else {
            self.handler.on_rejected(ctx).map_err(E::from)
        }
    }

    fn admit(&self, ctx: &RequestContext) -> bool {
        let admitted = self.rule.allow(ctx);
        if !admitted {
            debug!(
                rule = self.rule.name(),
                key = self.rule.limit_key(ctx),
                request = %ctx,
                "Request rejected"
            );
        }
        admitted
    }
}

impl<T, R: ?Sized, H: Clone> Clone for RateLimitExecutor<T, R, H> {
    fn clone(&self) -> Self {
        Self {
            rule: Arc::clone(&self.rule),
            handler: self.handler.clone(),
            _output: PhantomData,
        }
    }
}

impl<T, R, H> std::fmt::Debug for RateLimitExecutor<T, R, H>
where
    R: std::fmt::Debug + ?Sized,
    H: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitExecutor")
            .field("rule", &self.rule)
            .field("handler", &self.handler)
            .finish()
    }
}
