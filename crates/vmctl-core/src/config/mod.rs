//! Configuration and profile management for vmctl
//!
// Allow nested config module - this is intentional for the config subsystem

#![allow(clippy::module_inception)]
//!
//! # Features
//!
//! - Multiple named profiles, one per management server
//! - Environment variable expansion in config files
//! - Platform-specific config file locations
//! - Per-profile tracking settings (timeouts, polling, retries, throttling)

pub mod config;
pub mod error;
pub mod tracking;

// Re-export main types for convenience
pub use config::{Config, PASSWORD_ENV, Profile};
pub use error::{ConfigError, Result};
pub use tracking::{RateLimitConfig, RetryConfig, TrackingConfig};
