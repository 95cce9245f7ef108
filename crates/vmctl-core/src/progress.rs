//! Progress events for tracked operations
//!
//! The tracker and batch executor emit these so a presentation layer can
//! drive spinners or progress bars. Nothing in the core prints.

use std::sync::Arc;
use std::time::Duration;

use crate::operation::{OperationId, OperationKind, RemoteOperation};

/// Progress events emitted while tracking operations
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Operation has been accepted by the remote system
    Started {
        id: OperationId,
        target: String,
        kind: OperationKind,
    },
    /// Polling iteration with the current remote status
    Polling {
        id: OperationId,
        target: String,
        status: String,
        elapsed: Duration,
    },
    /// Transport failure while polling; tracking will retry
    Retrying {
        id: OperationId,
        target: String,
        attempt: u32,
        error: String,
    },
    /// Operation reached a terminal state (any of them)
    Finished(RemoteOperation),
}

impl ProgressEvent {
    pub fn target(&self) -> &str {
        match self {
            ProgressEvent::Started { target, .. }
            | ProgressEvent::Polling { target, .. }
            | ProgressEvent::Retrying { target, .. } => target,
            ProgressEvent::Finished(op) => &op.target,
        }
    }
}

/// Callback type for progress updates
///
/// Shared across concurrently tracked operations, hence `Arc`.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Helper to emit progress events
pub(crate) fn emit(callback: &Option<ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}
