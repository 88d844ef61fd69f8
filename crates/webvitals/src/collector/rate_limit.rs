//! Sliding-window admission gate shared by every worker of a batch
//!
//! At most `max_queries` admissions are granted in any trailing `window`. The
//! timestamp list is guarded by one lock that covers prune, check and record;
//! the lock is never held while a caller sleeps or while a request is in flight.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::collector::config::RateLimitConfig;
use crate::collector::core::{CollectorError, Result};

#[derive(Debug)]
pub struct RateLimiter {
    max_queries: usize,
    window: Duration,
    admissions: Mutex<VecDeque<Instant>>,
    waits: AtomicU64,
}

impl RateLimiter {
    /// Create a limiter; a zero ceiling or zero window could never admit and
    /// is rejected as a configuration error
    pub fn new(max_queries: usize, window: Duration) -> Result<Self> {
        if max_queries == 0 {
            return Err(CollectorError::Configuration {
                message: "rate limit max_queries must be greater than zero".to_string(),
                field: Some("rate_limit.max_queries".to_string()),
                suggestion: Some("Use the upstream quota, e.g. 60 queries per 60 seconds".to_string()),
            });
        }
        if window.is_zero() {
            return Err(CollectorError::Configuration {
                message: "rate limit window must be longer than zero".to_string(),
                field: Some("rate_limit.window".to_string()),
                suggestion: Some("Use the upstream quota window, e.g. 60 seconds".to_string()),
            });
        }

        Ok(Self {
            max_queries,
            window,
            admissions: Mutex::new(VecDeque::with_capacity(max_queries)),
            waits: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        Self::new(config.max_queries, config.window)
    }

    pub fn max_queries(&self) -> usize {
        self.max_queries
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of admissions that had to wait for the window to roll
    pub fn waits(&self) -> u64 {
        self.waits.load(Ordering::Relaxed)
    }

    /// Wait until one more request fits in the window, then record it
    pub async fn admit(&self) {
        let mut waited = false;
        loop {
            match self.try_admit(Instant::now()) {
                Ok(()) => return,
                Err(wait) => {
                    self.record_wait(&mut waited);
                    debug!("Rate limit reached, waiting {:?} before admitting", wait);
                    sleep(wait).await;
                }
            }
        }
    }

    /// Like [`admit`](Self::admit) but gives up as soon as `cancel` fires
    pub async fn admit_or_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        let mut waited = false;
        loop {
            if cancel.is_cancelled() {
                return Err(CollectorError::Cancelled {
                    reason: "cancelled while waiting for rate limit admission".to_string(),
                    url: None,
                });
            }
            match self.try_admit(Instant::now()) {
                Ok(()) => return Ok(()),
                Err(wait) => {
                    self.record_wait(&mut waited);
                    debug!("Rate limit reached, waiting {:?} before admitting", wait);
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = sleep(wait) => {}
                    }
                }
            }
        }
    }

    /// Count an admission the first time it has to wait
    fn record_wait(&self, waited: &mut bool) {
        if !*waited {
            *waited = true;
            self.waits.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Prune, check and record under one lock; on refusal return how long
    /// until the oldest admission leaves the window
    fn try_admit(&self, now: Instant) -> std::result::Result<(), Duration> {
        let mut admissions = self.admissions.lock().unwrap_or_else(PoisonError::into_inner);

        while let Some(&oldest) = admissions.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                admissions.pop_front();
            } else {
                break;
            }
        }

        if admissions.len() < self.max_queries {
            admissions.push_back(now);
            return Ok(());
        }

        // The deque is non-empty here since max_queries > 0
        let oldest = admissions.front().copied().unwrap_or(now);
        Err((oldest + self.window).saturating_duration_since(now))
    }

    /// Admissions currently inside the trailing window
    pub fn in_window(&self) -> usize {
        let now = Instant::now();
        let admissions = self.admissions.lock().unwrap_or_else(PoisonError::into_inner);
        admissions
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_zero_ceiling_is_a_configuration_error() {
        let err = RateLimiter::new(0, Duration::from_secs(60)).unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_zero_window_is_a_configuration_error() {
        let err = RateLimiter::new(10, Duration::ZERO).unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_admissions_do_not_wait() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10)).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            limiter.admit().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_window(), 3);
        assert_eq!(limiter.waits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_past_the_ceiling_waits_for_the_window() {
        let window = Duration::from_secs(10);
        let limiter = RateLimiter::new(3, window).unwrap();
        let start = Instant::now();
        for _ in 0..4 {
            limiter.admit().await;
        }
        assert!(start.elapsed() >= window, "elapsed {:?}", start.elapsed());
        assert!(limiter.waits() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_admission_is_counted_once() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(1)).unwrap());
        limiter.admit().await;

        // Both waiters wake at the same instant; the loser sleeps a second time
        let first = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move { limiter.admit().await }
        });
        let second = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move { limiter.admit().await }
        });
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(limiter.waits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_admissions_never_exceed_ceiling() {
        let max = 4;
        let window = Duration::from_secs(5);
        let limiter = Arc::new(RateLimiter::new(max, window).unwrap());

        let mut handles = Vec::new();
        for _ in 0..13 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.admit().await;
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        // Every run of max+1 consecutive admissions must span a full window
        for pair in times.windows(max + 1) {
            let span = pair[max].saturating_duration_since(pair[0]);
            assert!(span >= window, "{} admissions within {:?}", max + 1, span);
        }
        assert_eq!(times.len(), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_returns_promptly() {
        let limiter = RateLimiter::new(1, Duration::from_secs(3600)).unwrap();
        limiter.admit().await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = limiter.admit_or_cancel(&cancel).await;
        assert!(matches!(result, Err(CollectorError::Cancelled { .. })));
        assert!(start.elapsed() < Duration::from_secs(3600));
    }
}
