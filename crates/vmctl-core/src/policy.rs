//! Poll interval and transport retry policies

use std::time::Duration;

/// How often to poll a running operation
///
/// The interval grows geometrically from `initial` by `multiplier` after
/// every poll and never exceeds `max`. A multiplier of 1.0 gives a fixed
/// interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl PollPolicy {
    /// Fixed interval between polls
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            max: interval,
            multiplier: 1.0,
        }
    }

    /// Interval to wait before poll number `attempt` (0-based)
    pub fn interval(&self, attempt: u32) -> Duration {
        backoff(self.initial, self.max, self.multiplier, attempt)
    }
}

/// Bounded retry of poll transport failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Consecutive poll failures tolerated before tracking is declared lost
    pub max_attempts: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// No retries; the first transport failure loses tracking
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        backoff(
            self.backoff,
            self.max_backoff,
            2.0,
            attempt.saturating_sub(1),
        )
    }
}

fn backoff(initial: Duration, max: Duration, multiplier: f64, attempt: u32) -> Duration {
    let factor = multiplier.max(1.0).powi(attempt.min(64) as i32);
    let scaled = initial.as_nanos() as f64 * factor;
    if !scaled.is_finite() || scaled >= max.as_nanos() as f64 {
        max
    } else {
        Duration::from_nanos(scaled.round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_poll_policy_backs_off_to_cap() {
        let policy = PollPolicy::default();
        assert_eq!(policy.interval(0), Duration::from_millis(200));
        assert_eq!(policy.interval(1), Duration::from_millis(400));
        assert_eq!(policy.interval(2), Duration::from_millis(800));
        assert_eq!(policy.interval(4), Duration::from_millis(3200));
        assert_eq!(policy.interval(5), Duration::from_secs(5));
        assert_eq!(policy.interval(1000), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_poll_policy() {
        let policy = PollPolicy::fixed(Duration::from_millis(50));
        assert_eq!(policy.interval(0), Duration::from_millis(50));
        assert_eq!(policy.interval(10), Duration::from_millis(50));
    }

    #[test]
    fn test_multiplier_below_one_is_treated_as_fixed() {
        let policy = PollPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
            multiplier: 0.5,
        };
        assert_eq!(policy.interval(3), Duration::from_millis(100));
    }

    #[test]
    fn test_retry_delay() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.delay(1), Duration::from_millis(200));
        assert_eq!(retry.delay(2), Duration::from_millis(400));
        assert_eq!(retry.delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_retry_none() {
        assert_eq!(RetryPolicy::none().max_attempts, 0);
    }
}
