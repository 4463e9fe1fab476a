//! End-to-end admission scenarios against the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use turnstile::config::{ResourceRuleConfig, UserLevelRuleConfig};
use turnstile::ratelimit::{
    Clock, DefaultValueHandler, FixedWindowLimiter, ImmediateRejectHandler, IpRule, MockClock,
    RateLimitExecutor, RateLimitRule, RateLimiter, RequestContext, ResourceRule, Sweeper,
    TokenBucketLimiter, UserLevelRule,
};

fn request(level: &str, resource: &str, ip: &str) -> RequestContext {
    RequestContext::builder()
        .user_id("user-42")
        .user_level(level)
        .resource(resource)
        .method("GET")
        .ip(ip)
        .build()
}

#[test]
fn test_fixed_window_burst_of_150() {
    let limiter = FixedWindowLimiter::new(100, Duration::from_millis(1000)).unwrap();

    let results: Vec<bool> = (0..150).map(|_| limiter.try_acquire("client")).collect();

    assert!(results[..100].iter().all(|admitted| *admitted));
    assert!(results[100..].iter().all(|admitted| !*admitted));
}

#[test]
fn test_normal_tier_recovers_after_window() {
    let rule = UserLevelRule::new(&UserLevelRuleConfig::default()).unwrap();
    let ctx = request("normal", "order", "10.0.0.1");

    assert!(rule.allow(&ctx));
    std::thread::sleep(Duration::from_millis(100));
    assert!(!rule.allow(&ctx));

    std::thread::sleep(Duration::from_millis(2000));
    assert!(rule.allow(&ctx));
}

#[test]
fn test_token_bucket_refills_one_token() {
    let bucket = TokenBucketLimiter::new(5, Duration::from_millis(1000)).unwrap();

    for _ in 0..5 {
        assert!(bucket.try_acquire("k"));
    }
    assert!(!bucket.try_acquire("k"));

    std::thread::sleep(Duration::from_millis(200));
    assert!(bucket.try_acquire("k"));
}

#[tokio::test]
async fn test_sweeper_empties_idle_limiter() {
    let clock = MockClock::default();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let rule = IpRule::with_clock(10, Duration::from_millis(500), shared).unwrap();
    let sweeper = Sweeper::for_rule(&rule, Duration::from_millis(20)).unwrap();

    for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
        assert!(rule.allow(&request("", "", ip)));
    }
    let tracked: usize = rule.limiters().iter().map(|l| l.tracked_keys()).sum();
    assert_eq!(tracked, 3);

    clock.advance(Duration::from_millis(501));
    tokio::time::sleep(Duration::from_millis(150)).await;

    let tracked: usize = rule.limiters().iter().map(|l| l.tracked_keys()).sum();
    assert_eq!(tracked, 0);

    sweeper.shutdown().await.unwrap();
}

#[test]
fn test_concurrent_executors_respect_limit() {
    let clock = MockClock::default();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let rule: Arc<dyn RateLimitRule> =
        Arc::new(IpRule::with_clock(25, Duration::from_secs(1), shared).unwrap());
    let executor = RateLimitExecutor::new(rule, DefaultValueHandler::new(false));
    let runs = AtomicUsize::new(0);
    let ctx = request("", "", "192.168.0.7");

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..20 {
                    executor
                        .execute(&ctx, || {
                            runs.fetch_add(1, Ordering::SeqCst);
                            true
                        })
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(runs.load(Ordering::SeqCst), 25);
}

#[test]
fn test_reject_handler_surfaces_context() {
    let shared: Arc<dyn Clock> = Arc::new(MockClock::default());
    let rule = Arc::new(ResourceRule::with_clock(&ResourceRuleConfig::default(), shared).unwrap());
    let executor = RateLimitExecutor::new(rule, ImmediateRejectHandler);
    let ctx = request("gold", "admin", "10.9.9.9");

    let mut errors = Vec::new();
    for _ in 0..101 {
        if let Err(err) = executor.execute(&ctx, || ()) {
            errors.push(err);
        }
    }

    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].rejected_context(), Some(&ctx));
}
