//! Background purge of idle limiter state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::limiter::RateLimiter;
use super::rules::RateLimitRule;
use crate::error::{Result, TurnstileError};

/// Owned handle to a periodic task calling
/// [`purge_expired`](RateLimiter::purge_expired) on a set of limiters.
///
/// Call [`shutdown`](Self::shutdown) to stop the task and wait for it.
/// Dropping the handle also stops the task, without waiting.
#[derive(Debug)]
pub struct Sweeper {
    interval: Duration,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping `limiters` every `interval` on the current tokio runtime.
    ///
    /// # Errors
    /// Returns `TurnstileError::Config` for a zero interval and
    /// `TurnstileError::Sweeper` when called outside a tokio runtime.
    pub fn spawn(limiters: Vec<Arc<dyn RateLimiter>>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(TurnstileError::Config(
                "sweep interval must be greater than 0".to_string(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TurnstileError::Sweeper(e.to_string()))?;
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        info!(
            limiters = limiters.len(),
            interval_ms = interval.as_millis() as u64,
            "Starting limiter sweeper"
        );

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let removed = sweep(&limiters);
                        if removed > 0 {
                            debug!(removed, "Swept idle limiter keys");
                        }
                    }
                }
            }

            info!("Limiter sweeper stopped");
        });

        Ok(Self {
            interval,
            shutdown_tx,
            handle,
        })
    }

    /// Start sweeping every limiter owned by `rule`.
    pub fn for_rule(rule: &dyn RateLimitRule, interval: Duration) -> Result<Self> {
        Self::spawn(rule.limiters(), interval)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        // The task may already be gone, in which case nobody is listening.
        let _ = self.shutdown_tx.send(());
        self.handle
            .await
            .map_err(|e| TurnstileError::Sweeper(format!("sweeper task failed: {}", e)))
    }
}

/// Run one purge pass over `limiters`, returning the total keys removed.
pub fn sweep(limiters: &[Arc<dyn RateLimiter>]) -> usize {
    limiters.iter().map(|limiter| limiter.purge_expired()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::MockClock;
    use crate::ratelimit::FixedWindowLimiter;

    fn mock_window(limit: u32, window_ms: u64) -> (Arc<FixedWindowLimiter>, MockClock) {
        let clock = MockClock::default();
        let limiter = FixedWindowLimiter::with_clock(
            limit,
            Duration::from_millis(window_ms),
            Arc::new(clock.clone()),
        )
        .unwrap();
        (Arc::new(limiter), clock)
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let (limiter, _clock) = mock_window(1, 100);
        let limiters: Vec<Arc<dyn RateLimiter>> = vec![limiter];
        let err = Sweeper::spawn(limiters, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, TurnstileError::Sweeper(_)));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let (limiter, _clock) = mock_window(1, 100);
        let limiters: Vec<Arc<dyn RateLimiter>> = vec![limiter];
        let err = Sweeper::spawn(limiters, Duration::ZERO).unwrap_err();
        assert!(matches!(err, TurnstileError::Config(_)));
    }

    #[tokio::test]
    async fn test_sweeper_purges_idle_keys() {
        let (limiter, clock) = mock_window(5, 1000);
        let limiters: Vec<Arc<dyn RateLimiter>> = vec![limiter.clone()];
        let sweeper = Sweeper::spawn(limiters, Duration::from_millis(10)).unwrap();

        limiter.try_acquire("a");
        limiter.try_acquire("b");
        assert_eq!(limiter.tracked_keys(), 2);

        clock.advance(Duration::from_millis(1001));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(limiter.tracked_keys(), 0);
        sweeper.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweeping() {
        let (limiter, clock) = mock_window(5, 1000);
        let limiters: Vec<Arc<dyn RateLimiter>> = vec![limiter.clone()];
        let sweeper = Sweeper::spawn(limiters, Duration::from_millis(10)).unwrap();

        sweeper.shutdown().await.unwrap();

        limiter.try_acquire("a");
        clock.advance(Duration::from_secs(5));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_sweeping() {
        let (limiter, clock) = mock_window(5, 100);
        let limiters: Vec<Arc<dyn RateLimiter>> = vec![limiter.clone()];
        let sweeper = Sweeper::spawn(limiters, Duration::from_millis(10)).unwrap();

        drop(sweeper);
        tokio::time::sleep(Duration::from_millis(30)).await;

        limiter.try_acquire("a");
        clock.advance(Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_sweep_sums_all_limiters() {
        let (first, clock_a) = mock_window(5, 100);
        let (second, clock_b) = mock_window(5, 100);
        first.try_acquire("x");
        second.try_acquire("y");
        second.try_acquire("z");

        clock_a.advance(Duration::from_millis(150));
        clock_b.advance(Duration::from_millis(150));

        let limiters: Vec<Arc<dyn RateLimiter>> = vec![first, second];
        assert_eq!(sweep(&limiters), 3);
    }
}
