//! Rate limit rules.
//!
//! A rule maps a [`RequestContext`] to one of the limiters it owns and to the
//! key that limiter tracks. Limiter tables are built once, at rule
//! construction, from an explicit configuration value and are read-only
//! afterwards, so a rule can be shared freely between threads.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::context::RequestContext;
use super::fixed_window::FixedWindowLimiter;
use super::limiter::RateLimiter;
use crate::config::{IpRuleConfig, LimiterConfig, ResourceRuleConfig, UserLevelRuleConfig};
use crate::error::Result;

/// Decides whether a request may proceed.
pub trait RateLimitRule: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// The limiter key for `ctx`. Depends only on the context fields.
    fn limit_key<'a>(&self, ctx: &'a RequestContext) -> &'a str;

    /// The limiter responsible for `ctx`.
    fn limiter_for(&self, ctx: &RequestContext) -> &Arc<dyn RateLimiter>;

    /// Every limiter owned by this rule, for attaching a sweeper.
    fn limiters(&self) -> Vec<Arc<dyn RateLimiter>>;

    /// Take one permit for `ctx`, returning `true` if the request is admitted.
    fn allow(&self, ctx: &RequestContext) -> bool {
        let key = self.limit_key(ctx);
        let admitted = self.limiter_for(ctx).try_acquire(key);
        trace!(rule = self.name(), key, admitted, "Rule evaluated");
        admitted
    }
}

/// Named limiters plus a fallback for names missing from the table.
#[derive(Debug)]
struct LimiterTable {
    entries: HashMap<String, Arc<dyn RateLimiter>>,
    default: Arc<dyn RateLimiter>,
}

impl LimiterTable {
    fn build(
        entries: &HashMap<String, LimiterConfig>,
        default: &LimiterConfig,
        clock: &Arc<dyn Clock>,
    ) -> Result<Self> {
        let entries = entries
            .iter()
            .map(|(name, config)| -> Result<(String, Arc<dyn RateLimiter>)> {
                Ok((name.clone(), config.build_with_clock(Arc::clone(clock))?))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        let default = default.build_with_clock(Arc::clone(clock))?;
        Ok(Self { entries, default })
    }

    fn lookup(&self, name: &str) -> &Arc<dyn RateLimiter> {
        self.entries.get(name).unwrap_or(&self.default)
    }

    fn all(&self) -> Vec<Arc<dyn RateLimiter>> {
        self.entries
            .values()
            .chain(std::iter::once(&self.default))
            .cloned()
            .collect()
    }
}

/// Fixed window limit per client IP.
#[derive(Debug)]
pub struct IpRule {
    limiter: Arc<dyn RateLimiter>,
}

impl IpRule {
    /// Allow `limit` requests per IP in each `window`.
    pub fn new(limit: u32, window: Duration) -> Result<Self> {
        Self::with_clock(limit, window, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let limiter = FixedWindowLimiter::with_clock(limit, window, clock)?;
        debug!(limit, window_ms = window.as_millis() as u64, "Built IP rule");
        Ok(Self {
            limiter: Arc::new(limiter),
        })
    }

    pub fn from_config(config: &IpRuleConfig) -> Result<Self> {
        Self::new(config.limit, Duration::from_millis(config.window_ms))
    }
}

impl RateLimitRule for IpRule {
    fn name(&self) -> &'static str {
        "ip"
    }

    fn limit_key<'a>(&self, ctx: &'a RequestContext) -> &'a str {
        ctx.ip()
    }

    fn limiter_for(&self, _ctx: &RequestContext) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    fn limiters(&self) -> Vec<Arc<dyn RateLimiter>> {
        vec![Arc::clone(&self.limiter)]
    }
}

/// Limits per user tier.
///
/// The tier name is both the table lookup and the limiter key, so all users
/// of one tier share its quota. Tiers missing from the table share the
/// default limiter, each under its own key.
#[derive(Debug)]
pub struct UserLevelRule {
    table: LimiterTable,
}

impl UserLevelRule {
    pub fn new(config: &UserLevelRuleConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: &UserLevelRuleConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let table = LimiterTable::build(&config.tiers, &config.default, &clock)?;
        debug!(tiers = table.entries.len(), "Built user level rule");
        Ok(Self { table })
    }

    /// Whether `tier` has its own limiter rather than the default one.
    pub fn has_tier(&self, tier: &str) -> bool {
        self.table.entries.contains_key(tier)
    }
}

impl RateLimitRule for UserLevelRule {
    fn name(&self) -> &'static str {
        "user_level"
    }

    fn limit_key<'a>(&self, ctx: &'a RequestContext) -> &'a str {
        ctx.user_level()
    }

    fn limiter_for(&self, ctx: &RequestContext) -> &Arc<dyn RateLimiter> {
        self.table.lookup(ctx.user_level())
    }

    fn limiters(&self) -> Vec<Arc<dyn RateLimiter>> {
        self.table.all()
    }
}

/// Limits per resource name.
///
/// Resources missing from the table share the default limiter, each under
/// its own key. With the default token bucket those keys are never swept, so
/// a caller that controls `resource` can grow that limiter without bound.
/// Validate resource names before they reach the rule, or configure a fixed
/// window default and attach a [`Sweeper`](super::Sweeper).
#[derive(Debug)]
pub struct ResourceRule {
    table: LimiterTable,
}

impl ResourceRule {
    pub fn new(config: &ResourceRuleConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(config: &ResourceRuleConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let table = LimiterTable::build(&config.resources, &config.default, &clock)?;
        debug!(resources = table.entries.len(), "Built resource rule");
        Ok(Self { table })
    }

    /// Whether `resource` has its own limiter rather than the default one.
    pub fn has_resource(&self, resource: &str) -> bool {
        self.table.entries.contains_key(resource)
    }
}

impl RateLimitRule for ResourceRule {
    fn name(&self) -> &'static str {
        "resource"
    }

    fn limit_key<'a>(&self, ctx: &'a RequestContext) -> &'a str {
        ctx.resource()
    }

    fn limiter_for(&self, ctx: &RequestContext) -> &Arc<dyn RateLimiter> {
        self.table.lookup(ctx.resource())
    }

    fn limiters(&self) -> Vec<Arc<dyn RateLimiter>> {
        self.table.all()
    }
}
