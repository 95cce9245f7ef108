//! Tracking configuration stored per profile
//!
//! Everything here has a default, so a profile without a `[tracking]`
//! table behaves like one with every key spelled out.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::error::{ConfigError, Result};
use crate::executor::BatchOptions;
use crate::policy::{PollPolicy, RetryPolicy};

/// Timeouts, polling, retries and throttling for batch actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Per-operation deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// First poll interval in milliseconds
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,

    /// Poll interval ceiling in milliseconds
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,

    /// Growth factor applied to the poll interval after every poll
    #[serde(default = "default_poll_multiplier")]
    pub poll_multiplier: f64,

    /// Targets in flight at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Append a JSON line per finished operation to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_initial_ms: default_poll_initial_ms(),
            poll_max_ms: default_poll_max_ms(),
            poll_multiplier: default_poll_multiplier(),
            max_concurrency: default_max_concurrency(),
            audit_log: None,
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Poll transport retry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive poll failures tolerated before tracking is lost
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Maximum backoff in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Submission rate limiting configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Maximum submissions per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Submissions allowed back to back before throttling starts
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: default_requests_per_minute(),
            burst: default_burst(),
        }
    }
}

impl TrackingConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial: Duration::from_millis(self.poll_initial_ms),
            max: Duration::from_millis(self.poll_max_ms),
            multiplier: self.poll_multiplier,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff: Duration::from_millis(self.retry.backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            timeout: self.timeout(),
            poll: self.poll_policy(),
            max_concurrency: self.max_concurrency,
        }
    }

    /// Audit log location with `~` expanded
    pub fn audit_log_path(&self) -> Option<PathBuf> {
        self.audit_log
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
    }

    /// Reject values that would make tracking misbehave
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency", "must be at least 1"));
        }
        if self.poll_initial_ms == 0 {
            return Err(invalid("poll_initial_ms", "must be greater than zero"));
        }
        if self.poll_max_ms < self.poll_initial_ms {
            return Err(invalid("poll_max_ms", "must not be below poll_initial_ms"));
        }
        if !self.poll_multiplier.is_finite() || self.poll_multiplier < 1.0 {
            return Err(invalid("poll_multiplier", "must be a number >= 1.0"));
        }
        if self.retry.max_backoff_ms < self.retry.backoff_ms {
            return Err(invalid("retry.max_backoff_ms", "must not be below retry.backoff_ms"));
        }
        if self.rate_limit.enabled && self.rate_limit.requests_per_minute == 0 {
            return Err(invalid(
                "rate_limit.requests_per_minute",
                "must be greater than zero when rate limiting is enabled",
            ));
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_timeout_secs() -> u64 {
    600
}

fn default_poll_initial_ms() -> u64 {
    200
}

fn default_poll_max_ms() -> u64 {
    5000
}

fn default_poll_multiplier() -> f64 {
    2.0
}

fn default_max_concurrency() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5000
}

fn default_requests_per_minute() -> u32 {
    120
}

fn default_burst() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policies() {
        let config = TrackingConfig::default();
        assert_eq!(config.poll_policy(), PollPolicy::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.timeout(), Duration::from_secs(600));
        assert_eq!(config.batch_options(), BatchOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_table_fills_defaults() {
        let config: TrackingConfig = toml::from_str(
            r#"
timeout_secs = 30

[retry]
max_attempts = 5

[rate_limit]
enabled = true
"#,
        )
        .unwrap();

        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.poll_initial_ms, 200);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_ms, 200);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.requests_per_minute, 120);
        assert_eq!(config.rate_limit.burst, 10);
        assert!(!config.is_default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = TrackingConfig {
            max_concurrency: 0,
            ..TrackingConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));

        let config = TrackingConfig {
            poll_multiplier: 0.5,
            ..TrackingConfig::default()
        };
        assert!(config.validate().is_err());

        let config = TrackingConfig {
            poll_initial_ms: 1000,
            poll_max_ms: 500,
            ..TrackingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
