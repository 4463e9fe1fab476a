//! Synthetic load for exercising a rule and handler pair.
//!
//! Used by the `turnstile simulate` command to show how a configured rule
//! behaves under concurrent callers.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::config::TurnstileConfig;
use crate::error::Result;
use crate::ratelimit::{
    DefaultValueHandler, ImmediateRejectHandler, IpRule, RateLimitExecutor, RateLimitRule,
    RejectedHandler, RequestContext, ResourceRule, UserLevelRule,
};

/// Which rule to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    Ip,
    UserLevel,
    Resource,
}

/// Which rejection policy to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HandlerKind {
    /// Return a fallback value
    Default,
    /// Fail with a rate limit error
    Reject,
}

/// Parameters of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub rule: RuleKind,
    pub handler: HandlerKind,
    /// Total requests across all threads
    pub requests: usize,
    pub threads: usize,
    /// Pause between consecutive requests on one thread
    pub pause: Duration,
    /// Context sent with every request
    pub context: RequestContext,
}

/// Tally of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub rule: RuleKind,
    pub handler: HandlerKind,
    pub requests: usize,
    pub admitted: usize,
    /// Rejections answered with the fallback value
    pub fallbacks: usize,
    /// Rejections surfaced as errors
    pub errors: usize,
    pub elapsed_ms: u64,
}

impl SimulationReport {
    pub fn rejected(&self) -> usize {
        self.fallbacks + self.errors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Admitted,
    Fallback,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    admitted: usize,
    fallbacks: usize,
    errors: usize,
}

/// Build the rule selected by `kind` from `config`.
pub fn build_rule(kind: RuleKind, config: &TurnstileConfig) -> Result<Arc<dyn RateLimitRule>> {
    let rule: Arc<dyn RateLimitRule> = match kind {
        RuleKind::Ip => Arc::new(IpRule::from_config(&config.ip)?),
        RuleKind::UserLevel => Arc::new(UserLevelRule::new(&config.user_level)?),
        RuleKind::Resource => Arc::new(ResourceRule::new(&config.resource)?),
    };
    Ok(rule)
}

/// Fire `plan.requests` requests through `rule` from `plan.threads` threads.
pub fn run(rule: Arc<dyn RateLimitRule>, plan: &SimulationPlan) -> SimulationReport {
    let started = Instant::now();
    let tally = match plan.handler {
        HandlerKind::Default => drive(
            RateLimitExecutor::new(rule, DefaultValueHandler::new(Outcome::Fallback)),
            plan,
        ),
        HandlerKind::Reject => drive(RateLimitExecutor::new(rule, ImmediateRejectHandler), plan),
    };

    let report = SimulationReport {
        rule: plan.rule,
        handler: plan.handler,
        requests: plan.requests,
        admitted: tally.admitted,
        fallbacks: tally.fallbacks,
        errors: tally.errors,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        rule = ?report.rule,
        admitted = report.admitted,
        rejected = report.rejected(),
        elapsed_ms = report.elapsed_ms,
        "Simulation finished"
    );

    report
}

fn drive<H>(executor: RateLimitExecutor<Outcome, dyn RateLimitRule, H>, plan: &SimulationPlan) -> Tally
where
    H: RejectedHandler<Outcome>,
{
    let threads = plan.threads.max(1);
    let executor = &executor;

    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|worker| {
                // Spread the remainder over the first workers
                let share = plan.requests / threads + usize::from(worker < plan.requests % threads);
                scope.spawn(move || {
                    let mut tally = Tally::default();
                    for i in 0..share {
                        if i > 0 && !plan.pause.is_zero() {
                            std::thread::sleep(plan.pause);
                        }
                        match executor.execute(&plan.context, || Outcome::Admitted) {
                            Ok(Outcome::Admitted) => tally.admitted += 1,
                            Ok(Outcome::Fallback) => tally.fallbacks += 1,
                            Err(_) => tally.errors += 1,
                        }
                    }
                    tally
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| {
                worker
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .fold(Tally::default(), |acc, t| Tally {
                admitted: acc.admitted + t.admitted,
                fallbacks: acc.fallbacks + t.fallbacks,
                errors: acc.errors + t.errors,
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(rule: RuleKind, handler: HandlerKind, requests: usize, threads: usize) -> SimulationPlan {
        SimulationPlan {
            rule,
            handler,
            requests,
            threads,
            pause: Duration::ZERO,
            context: RequestContext::new("u-1", "gold", "admin", "GET", "10.0.0.1"),
        }
    }

    #[test]
    fn test_ip_simulation_with_fallback() {
        let config = TurnstileConfig::default();
        let plan = plan(RuleKind::Ip, HandlerKind::Default, 150, 1);
        let report = run(build_rule(plan.rule, &config).unwrap(), &plan);

        assert_eq!(report.admitted, 100);
        assert_eq!(report.fallbacks, 50);
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn test_concurrent_user_level_simulation_with_reject() {
        let config = TurnstileConfig::default();
        let plan = plan(RuleKind::UserLevel, HandlerKind::Reject, 203, 4);
        let report = run(build_rule(plan.rule, &config).unwrap(), &plan);

        assert_eq!(report.admitted, 50);
        assert_eq!(report.errors, 153);
        assert_eq!(report.rejected() + report.admitted, 203);
    }

    #[test]
    fn test_more_threads_than_requests() {
        let config = TurnstileConfig::default();
        let plan = plan(RuleKind::Ip, HandlerKind::Default, 3, 8);
        let report = run(build_rule(plan.rule, &config).unwrap(), &plan);

        assert_eq!(report.admitted, 3);
        assert_eq!(report.rejected(), 0);
    }

    #[derive(Debug)]
    struct ExplodingRule {
        limiter: Arc<dyn crate::ratelimit::RateLimiter>,
    }

    impl RateLimitRule for ExplodingRule {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn limit_key<'a>(&self, ctx: &'a RequestContext) -> &'a str {
            ctx.ip()
        }

        fn limiter_for(&self, _ctx: &RequestContext) -> &Arc<dyn crate::ratelimit::RateLimiter> {
            &self.limiter
        }

        fn limiters(&self) -> Vec<Arc<dyn crate::ratelimit::RateLimiter>> {
            vec![Arc::clone(&self.limiter)]
        }

        fn allow(&self, _ctx: &RequestContext) -> bool {
            panic!("rule failed");
        }
    }

    #[test]
    #[should_panic(expected = "rule failed")]
    fn test_worker_panic_propagates() {
        let rule = ExplodingRule {
            limiter: crate::config::LimiterConfig::fixed_window(1, 1000)
                .build()
                .unwrap(),
        };
        let plan = plan(RuleKind::Ip, HandlerKind::Reject, 4, 2);
        run(Arc::new(rule), &plan);
    }

    #[test]
    fn test_report_serializes_kinds_in_kebab_case() {
        let report = SimulationReport {
            rule: RuleKind::UserLevel,
            handler: HandlerKind::Reject,
            requests: 1,
            admitted: 1,
            fallbacks: 0,
            errors: 0,
            elapsed_ms: 0,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rule"], "user-level");
        assert_eq!(json["handler"], "reject");
    }
}
