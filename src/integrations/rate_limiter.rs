use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

/// Default fraction of the provider's limit left unused.
pub const DEFAULT_SAFETY_MARGIN: f64 = 0.1;

/// Spaces calls evenly at a fraction of a provider's published rate limit.
///
/// Slots are reserved under a mutex, so concurrent callers are served in the
/// order they reserve and never share a slot.
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// `safety_margin` is clamped to `[0, 0.99]`; a non-positive rate disables pacing.
    pub fn new(requests_per_second: f64, safety_margin: f64) -> Self {
        let margin = safety_margin.clamp(0.0, 0.99);
        let effective_rate = requests_per_second * (1.0 - margin);
        let interval = if effective_rate > 0.0 && effective_rate.is_finite() {
            Duration::from_secs_f64(1.0 / effective_rate)
        } else {
            Duration::ZERO
        };

        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn with_default_margin(requests_per_second: f64) -> Self {
        Self::new(requests_per_second, DEFAULT_SAFETY_MARGIN)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next call is allowed. The first call never waits.
    pub async fn wait(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_does_not_wait() {
        let limiter = RateLimiter::new(2.0, 0.0);
        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_calls_respect_rate() {
        let limiter = RateLimiter::new(10.0, 0.0);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.wait().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_safety_margin_reduces_rate() {
        let limiter = RateLimiter::new(2.0, 0.5);
        assert_eq!(limiter.interval(), Duration::from_secs(1));

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn test_default_margin() {
        let limiter = RateLimiter::with_default_margin(2.0);
        let expected = 1.0 / 1.8;
        assert!((limiter.interval().as_secs_f64() - expected).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_the_rate() {
        let limiter = Arc::new(RateLimiter::new(10.0, 0.0));
        let start = Instant::now();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    for _ in 0..5 {
                        limiter.wait().await;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // 15 calls need 14 intervals
        assert!(start.elapsed() >= Duration::from_millis(1400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_never_waits() {
        let limiter = RateLimiter::new(0.0, 0.1);
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
