//! Retry policy, call pacing and the sleep abstraction they share.
//!
//! Two independent waits surround every call to the extraction service:
//!
//! * **Retry delay** - taken only after a failed attempt, before the next
//!   one. Chosen by [`RetryPolicy::delay_for`] from the failure kind.
//! * **Pacing** - taken before every call except the first, whatever the
//!   outcome of the previous one. [`Pacer`] keeps consecutive calls at least
//!   `min_interval` apart to stay under the provider's calls-per-minute
//!   ceiling.
//!
//! The two add up: after a retry delay, [`Pacer::restart`] starts the
//! pacing interval over, so a retried call waits for both.
//!
//! Both go through [`Sleeper`] so tests can record the waits instead of
//! spending wall-clock time on them.

use crate::error::ServiceError;
use futures::future::BoxFuture;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Something that can wait.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// How many times a page is attempted and how long to pause in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls per page, first attempt included. Default: 3.
    pub max_attempts: u32,
    /// Pause after an ordinary failure. Default: 1 s.
    pub retry_delay: Duration,
    /// Pause after the provider reported quota exhaustion. Default: 5 s.
    pub quota_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            quota_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Pause to take after `attempt` (1-indexed) failed with `error`.
    ///
    /// Returns `None` when no attempt is left.
    pub fn delay_for(&self, attempt: u32, error: &ServiceError) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        if error.is_quota() {
            Some(self.quota_delay)
        } else {
            Some(self.retry_delay)
        }
    }
}

/// Keeps consecutive service calls at least `min_interval` apart.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until a call is allowed, then mark it as made.
    ///
    /// The first call goes through immediately.
    pub async fn wait_turn(&self, sleeper: &dyn Sleeper) {
        let remaining = {
            let last = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
            last.map(|t| self.min_interval.saturating_sub(t.elapsed()))
        };
        if let Some(wait) = remaining.filter(|w| !w.is_zero()) {
            debug!("Pacing: waiting {}ms before next call", wait.as_millis());
            sleeper.sleep(wait).await;
        }
        self.mark();
    }

    /// Start the interval over from now, if a call has been made.
    ///
    /// Called after a retry delay so that the delay does not use up the
    /// pacing interval.
    pub fn restart(&self) {
        let mut last = self.last_call.lock().unwrap_or_else(|e| e.into_inner());
        if last.is_some() {
            *last = Some(Instant::now());
        }
    }

    fn mark(&self) {
        *self.last_call.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSleeper;
    use super::*;

    #[test]
    fn ordinary_failures_use_short_delay() {
        let policy = RetryPolicy::default();
        let err = ServiceError::Parse("truncated".into());
        assert_eq!(policy.delay_for(1, &err), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(2, &err), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(3, &err), None);
    }

    #[test]
    fn quota_failures_use_long_delay() {
        let policy = RetryPolicy::default();
        let err = ServiceError::QuotaExceeded("429".into());
        assert_eq!(policy.delay_for(1, &err), Some(Duration::from_secs(5)));
    }

    #[test]
    fn single_attempt_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(1, &ServiceError::Other("x".into())), None);
    }

    #[tokio::test]
    async fn pacer_lets_first_call_through() {
        let sleeper = RecordingSleeper::new();
        let pacer = Pacer::new(Duration::from_secs(4));
        pacer.wait_turn(sleeper.as_ref()).await;
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn pacer_waits_between_calls() {
        let sleeper = RecordingSleeper::new();
        let pacer = Pacer::new(Duration::from_secs(4));
        pacer.wait_turn(sleeper.as_ref()).await;
        pacer.wait_turn(sleeper.as_ref()).await;
        pacer.wait_turn(sleeper.as_ref()).await;

        let waits = sleeper.waits();
        assert_eq!(waits.len(), 2);
        for w in waits {
            // Nearly the full interval: only microseconds passed between calls.
            assert!(w > Duration::from_millis(3900), "wait too short: {w:?}");
            assert!(w <= Duration::from_secs(4));
        }
    }

    #[tokio::test]
    async fn restart_before_any_call_keeps_first_call_free() {
        let sleeper = RecordingSleeper::new();
        let pacer = Pacer::new(Duration::from_secs(4));
        pacer.restart();
        pacer.wait_turn(sleeper.as_ref()).await;
        assert!(sleeper.waits().is_empty());
    }

    #[tokio::test]
    async fn restart_adds_full_interval_after_a_delay() {
        let pacer = Pacer::new(Duration::from_millis(40));
        pacer.wait_turn(&TokioSleeper).await;
        let start = Instant::now();
        TokioSleeper.sleep(Duration::from_millis(40)).await;
        pacer.restart();
        pacer.wait_turn(&TokioSleeper).await;
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn pacer_with_real_sleeper_spaces_calls() {
        let pacer = Pacer::new(Duration::from_millis(30));
        let start = Instant::now();
        for _ in 0..4 {
            pacer.wait_turn(&TokioSleeper).await;
        }
        assert!(start.elapsed() >= Duration::from_millis(90));
    }
}
