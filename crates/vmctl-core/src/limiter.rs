//! Submission rate limiting shared by a whole batch

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;

use crate::config::RateLimitConfig;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Bounds how fast new remote actions are started
pub struct SubmissionLimiter {
    limiter: DirectLimiter,
    requests_per_minute: NonZeroU32,
}

impl SubmissionLimiter {
    pub fn per_minute(requests_per_minute: NonZeroU32, burst: NonZeroU32) -> Self {
        let quota = Quota::per_minute(requests_per_minute).allow_burst(burst);
        Self {
            limiter: RateLimiter::direct(quota),
            requests_per_minute,
        }
    }

    /// Build from configuration; `None` when disabled or configured with zero
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let rpm = NonZeroU32::new(config.requests_per_minute)?;
        let burst = NonZeroU32::new(config.burst).unwrap_or(NonZeroU32::MIN);
        Some(Self::per_minute(rpm, burst))
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute.get()
    }

    /// Wait until another submission is allowed
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_throttled() {
        let limiter = SubmissionLimiter::per_minute(
            NonZeroU32::new(1).unwrap(),
            NonZeroU32::new(3).unwrap(),
        );
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_from_config() {
        let mut config = RateLimitConfig::default();
        assert!(SubmissionLimiter::from_config(&config).is_none());

        config.enabled = true;
        config.requests_per_minute = 60;
        let limiter = SubmissionLimiter::from_config(&config).unwrap();
        assert_eq!(limiter.requests_per_minute(), 60);

        config.requests_per_minute = 0;
        assert!(SubmissionLimiter::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn test_acquire_within_burst_is_immediate() {
        let limiter = SubmissionLimiter::per_minute(
            NonZeroU32::new(600).unwrap(),
            NonZeroU32::new(5).unwrap(),
        );
        for _ in 0..5 {
            limiter.acquire().await;
        }
    }
}
