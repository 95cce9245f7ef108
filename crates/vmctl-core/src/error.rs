//! Error types for vmctl-core
//!
//! Two layers of errors live here:
//!
//! - [`OperationError`] is *data*. It is recorded inside a terminal
//!   [`RemoteOperation`](crate::operation::RemoteOperation) and never raised
//!   out of the batch executor.
//! - [`CoreError`] is raised to the immediate caller for contract violations
//!   (malformed target sets, unknown operation ids) and for configuration or
//!   inventory problems.
//!
//! # Example
//!
//! ```rust
//! use vmctl_core::{ErrorKind, OperationError};
//!
//! let err = OperationError::new(ErrorKind::TrackingLost, "connection reset");
//! assert!(err.is_tracking_lost());
//! assert!(!err.is_remote());
//! assert_eq!(err.to_string(), "tracking lost: connection reset");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of why an operation did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote action could not be started
    Submission,
    /// The remote system reported that the action failed
    Remote,
    /// We lost the ability to observe the operation; its outcome is unknown
    TrackingLost,
    /// No terminal state was observed before the deadline
    Timeout,
    /// The target was not eligible for the action
    Precondition,
    /// Tracking was cancelled by the caller
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Submission => "submission failed",
            ErrorKind::Remote => "remote execution failed",
            ErrorKind::TrackingLost => "tracking lost",
            ErrorKind::Timeout => "timed out",
            ErrorKind::Precondition => "precondition not met",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Error payload carried by a terminal operation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn submission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Submission, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Remote, message)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Precondition, message)
    }

    #[must_use]
    pub fn is_submission(&self) -> bool {
        self.kind == ErrorKind::Submission
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.kind == ErrorKind::Remote
    }

    #[must_use]
    pub fn is_tracking_lost(&self) -> bool {
        self.kind == ErrorKind::TrackingLost
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    #[must_use]
    pub fn is_precondition(&self) -> bool {
        self.kind == ErrorKind::Precondition
    }

    /// Returns true if re-running the action might produce a different result
    ///
    /// A lost or timed-out operation may still complete remotely, so callers
    /// should inspect the target before retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Submission | ErrorKind::TrackingLost | ErrorKind::Timeout
        )
    }
}

/// Failure while polling an operation handle (transport level)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("poll failed: {0}")]
pub struct PollError(pub String);

/// Core error type raised to callers
#[derive(Error, Debug)]
pub enum CoreError {
    /// The target set handed to the batch executor is malformed
    #[error("Invalid target set: {0}")]
    InvalidTargetSet(String),

    /// No tracked operation with this id
    #[error("Operation {0} not found")]
    OperationNotFound(u64),

    /// Target filter could not be compiled
    #[error("Invalid filter '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Inventory file could not be loaded or is inconsistent
    #[error("Inventory error: {0}")]
    Inventory(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Audit log could not be written
    #[error("Audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Returns true if this is a "not found" error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::OperationNotFound(_))
    }

    /// Returns true if the caller passed bad input
    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidTargetSet(_) | CoreError::InvalidFilter { .. }
        )
    }
}
