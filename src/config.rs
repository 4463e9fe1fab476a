//! Configuration for Turnstile rules and limiters.
//!
//! Every section has defaults, so an empty document yields the stock tier and
//! resource tables. Configuration is parsed from memory only; where the text
//! comes from is up to the embedding application.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{Clock, FixedWindowLimiter, RateLimiter, SystemClock, TokenBucketLimiter};

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Per-client-IP limiting
    #[serde(default)]
    pub ip: IpRuleConfig,

    /// Per-user-tier limiting
    #[serde(default)]
    pub user_level: UserLevelRuleConfig,

    /// Per-resource limiting
    #[serde(default)]
    pub resource: ResourceRuleConfig,

    /// Background purge of idle limiter state
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

impl TurnstileConfig {
    /// Parse configuration from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))
    }
}

/// Algorithm and parameters for one limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterConfig {
    /// At most `limit` requests per `window_ms`
    FixedWindow { limit: u32, window_ms: u64 },
    /// `capacity` tokens refilled every `refill_period_ms`
    TokenBucket { capacity: u32, refill_period_ms: u64 },
}

impl LimiterConfig {
    pub fn fixed_window(limit: u32, window_ms: u64) -> Self {
        LimiterConfig::FixedWindow { limit, window_ms }
    }

    pub fn token_bucket(capacity: u32, refill_period_ms: u64) -> Self {
        LimiterConfig::TokenBucket {
            capacity,
            refill_period_ms,
        }
    }

    /// Build the limiter on the system clock.
    pub fn build(&self) -> Result<Arc<dyn RateLimiter>> {
        self.build_with_clock(Arc::new(SystemClock::new()))
    }

    /// Build the limiter reading time from `clock`.
    pub fn build_with_clock(&self, clock: Arc<dyn Clock>) -> Result<Arc<dyn RateLimiter>> {
        let limiter: Arc<dyn RateLimiter> = match *self {
            LimiterConfig::FixedWindow { limit, window_ms } => Arc::new(
                FixedWindowLimiter::with_clock(limit, Duration::from_millis(window_ms), clock)?,
            ),
            LimiterConfig::TokenBucket {
                capacity,
                refill_period_ms,
            } => Arc::new(TokenBucketLimiter::with_clock(
                capacity,
                Duration::from_millis(refill_period_ms),
                clock,
            )?),
        };
        Ok(limiter)
    }
}

/// IP rule configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRuleConfig {
    /// Requests allowed per client IP in each window
    #[serde(default = "default_ip_limit")]
    pub limit: u32,

    /// Window size in milliseconds
    #[serde(default = "default_ip_window_ms")]
    pub window_ms: u64,
}

impl Default for IpRuleConfig {
    fn default() -> Self {
        Self {
            limit: default_ip_limit(),
            window_ms: default_ip_window_ms(),
        }
    }
}

fn default_ip_limit() -> u32 {
    100
}

fn default_ip_window_ms() -> u64 {
    1000
}

/// User tier rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLevelRuleConfig {
    /// Limiter per tier name
    #[serde(default = "default_tiers")]
    pub tiers: HashMap<String, LimiterConfig>,

    /// Limiter shared by tiers missing from the table
    #[serde(default = "default_tier_limiter")]
    pub default: LimiterConfig,
}

impl Default for UserLevelRuleConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            default: default_tier_limiter(),
        }
    }
}

fn default_tiers() -> HashMap<String, LimiterConfig> {
    [
        ("normal", LimiterConfig::fixed_window(1, 2000)),
        ("silver", LimiterConfig::fixed_window(30, 2000)),
        ("gold", LimiterConfig::fixed_window(50, 2000)),
        ("vip", LimiterConfig::fixed_window(100, 2000)),
    ]
    .into_iter()
    .map(|(tier, limiter)| (tier.to_string(), limiter))
    .collect()
}

fn default_tier_limiter() -> LimiterConfig {
    LimiterConfig::fixed_window(1, 2000)
}

/// Resource rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRuleConfig {
    /// Limiter per resource name
    #[serde(default = "default_resources")]
    pub resources: HashMap<String, LimiterConfig>,

    /// Limiter shared by resources missing from the table
    #[serde(default = "default_resource_limiter")]
    pub default: LimiterConfig,
}

impl Default for ResourceRuleConfig {
    fn default() -> Self {
        Self {
            resources: default_resources(),
            default: default_resource_limiter(),
        }
    }
}

fn default_resources() -> HashMap<String, LimiterConfig> {
    [
        ("order", LimiterConfig::token_bucket(1000, 1000)),
        ("userInfo", LimiterConfig::token_bucket(500, 1000)),
        ("admin", LimiterConfig::token_bucket(100, 1000)),
    ]
    .into_iter()
    .map(|(resource, limiter)| (resource.to_string(), limiter))
    .collect()
}

fn default_resource_limiter() -> LimiterConfig {
    LimiterConfig::token_bucket(100, 1000)
}

/// Sweeper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Interval between purge passes in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub interval_ms: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}
