//! Token bucket request limiter
//!
//!  Callers that would exceed the budget wait for the next token instead of
//!  being rejected, so the remote ceiling is never crossed.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use tracing::debug;

type DirectLimiter = Governor<NotKeyed, InMemoryState, DefaultClock>;

pub struct RateLimiter {
    /// `None` when the refill period is zero, i.e. unlimited
    inner: Option<DirectLimiter>,
}

impl RateLimiter {
    /// `capacity` requests may go out back to back; after that one more
    /// every `refill_period`. Starts full.
    pub fn new(capacity: u32, refill_period: Duration) -> Self {
        let burst = NonZeroU32::new(capacity.max(1)).unwrap_or(NonZeroU32::MIN);
        let inner = Quota::with_period(refill_period)
            .map(|quota| Governor::direct(quota.allow_burst(burst)));
        Self { inner }
    }

    /// Take a token, sleeping until one is available
    pub async fn acquire(&self) {
        let Some(limiter) = &self.inner else {
            return;
        };
        if limiter.check().is_err() {
            debug!("Request budget exhausted, waiting for a token");
            limiter.until_ready().await;
        }
    }

    /// Take a token if one is available right now
    #[cfg(test)]
    pub fn try_acquire(&self) -> bool {
        self.inner.as_ref().is_none_or(|l| l.check().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn test_burst_then_spacing() {
        let limiter = RateLimiter::new(3, Duration::from_millis(100));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));

        let mut last = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
            let now = Instant::now();
            assert!(now.duration_since(last) >= Duration::from_millis(80));
            last = now;
        }
    }

    #[test]
    fn test_refills_up_to_capacity() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        std::thread::sleep(Duration::from_millis(300));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_zero_period_is_unlimited() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        for _ in 0..100 {
            assert!(limiter.try_acquire());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_exceed_ceiling() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::from_millis(50)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }
        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.unwrap());
        }
        times.sort();

        // 2 immediately, then one per refill period
        assert!(times[5].duration_since(start) >= Duration::from_millis(180));
        for window in times.windows(3) {
            assert!(window[2].duration_since(window[0]) >= Duration::from_millis(40));
        }
    }
}
