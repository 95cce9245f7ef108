//! Remote operation model
//!
//! A [`RemoteOperation`] is one in-flight action against one target. The
//! tracker owns the mutable record; everything handed out is a clone.
//!
//! State machine:
//!
//! ```text
//! Submitted ──► Running ──► Succeeded | Failed
//!     │            │
//!     └────────────┴──────► TimedOut | Cancelled   (and Failed on submission)
//! ```
//!
//! Terminal states absorb every further transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ErrorKind, OperationError};

/// Tracker-assigned identifier, unique within one tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Lifecycle actions that can be applied to a virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    PowerOn,
    PowerOff,
    Snapshot,
    Revert,
    Reconfigure,
    ChangeNetwork,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::PowerOn,
        OperationKind::PowerOff,
        OperationKind::Snapshot,
        OperationKind::Revert,
        OperationKind::Reconfigure,
        OperationKind::ChangeNetwork,
        OperationKind::Delete,
    ];

    /// Human readable verb used in logs and reports
    pub fn verb(&self) -> &'static str {
        match self {
            OperationKind::PowerOn => "power on",
            OperationKind::PowerOff => "power off",
            OperationKind::Snapshot => "snapshot",
            OperationKind::Revert => "revert",
            OperationKind::Reconfigure => "reconfigure",
            OperationKind::ChangeNetwork => "change network",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::PowerOn => "power-on",
            OperationKind::PowerOff => "power-off",
            OperationKind::Snapshot => "snapshot",
            OperationKind::Revert => "revert",
            OperationKind::Reconfigure => "reconfigure",
            OperationKind::ChangeNetwork => "change-network",
            OperationKind::Delete => "delete",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl OperationState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Succeeded
                | OperationState::Failed
                | OperationState::TimedOut
                | OperationState::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`
    #[must_use]
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (OperationState::Submitted, OperationState::Submitted) => false,
            (OperationState::Running, OperationState::Running) => false,
            (OperationState::Running, OperationState::Submitted) => false,
            _ => true,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationState::Submitted => "submitted",
            OperationState::Running => "running",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
            OperationState::TimedOut => "timed_out",
            OperationState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of one tracked remote operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOperation {
    pub id: OperationId,
    /// Handle assigned by the remote system; absent if submission failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    pub target: String,
    pub kind: OperationKind,
    pub state: OperationState,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    /// Set when the action was not needed (target already in desired state)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl RemoteOperation {
    pub(crate) fn new(id: OperationId, target: &str, kind: OperationKind) -> Self {
        Self {
            id,
            handle: None,
            target: target.to_string(),
            kind,
            state: OperationState::Submitted,
            submitted_at: Utc::now(),
            completed_at: None,
            error: None,
            skip_reason: None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == OperationState::Succeeded
    }

    /// Error kind of a non-successful terminal operation
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Duration between submission and completion, if completed
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.completed_at
            .map(|done| done.signed_duration_since(self.submitted_at))
    }

    /// Apply a state transition
    ///
    /// Returns false and leaves the record untouched when the transition is
    /// not allowed. `completed_at` is stamped on the first move into a
    /// terminal state; `error` is only recorded alongside a terminal state.
    pub(crate) fn transition(
        &mut self,
        next: OperationState,
        error: Option<OperationError>,
    ) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }

        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
            if next != OperationState::Succeeded {
                self.error = Some(error.unwrap_or_else(|| default_error(next)));
            }
        }
        true
    }
}

fn default_error(state: OperationState) -> OperationError {
    match state {
        OperationState::TimedOut => {
            OperationError::new(ErrorKind::Timeout, "no terminal state before deadline")
        }
        OperationState::Cancelled => {
            OperationError::new(ErrorKind::Cancelled, "tracking cancelled by caller")
        }
        _ => OperationError::remote("operation failed without an error payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> RemoteOperation {
        RemoteOperation::new(OperationId(1), "vm-a", OperationKind::PowerOn)
    }

    #[test]
    fn test_new_operation_is_submitted() {
        let op = op();
        assert_eq!(op.state, OperationState::Submitted);
        assert!(op.completed_at.is_none());
        assert!(op.error.is_none());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut op = op();
        assert!(op.transition(OperationState::Running, None));
        assert!(op.completed_at.is_none());
        assert!(op.transition(OperationState::Succeeded, None));
        assert!(op.completed_at.is_some());
        assert!(op.error.is_none());
    }

    #[test]
    fn test_terminal_state_absorbs() {
        let mut op = op();
        op.transition(OperationState::Running, None);
        op.transition(OperationState::Failed, Some(OperationError::remote("boom")));
        let completed = op.completed_at;

        assert!(!op.transition(OperationState::Succeeded, None));
        assert!(!op.transition(OperationState::Running, None));
        assert_eq!(op.state, OperationState::Failed);
        assert_eq!(op.completed_at, completed);
        assert_eq!(op.error.as_ref().unwrap().message, "boom");
    }

    #[test]
    fn test_running_cannot_go_back_to_submitted() {
        let mut op = op();
        op.transition(OperationState::Running, None);
        assert!(!op.transition(OperationState::Submitted, None));
        assert_eq!(op.state, OperationState::Running);
    }

    #[test]
    fn test_non_success_terminal_always_has_error() {
        for state in [
            OperationState::Failed,
            OperationState::TimedOut,
            OperationState::Cancelled,
        ] {
            let mut op = op();
            op.transition(state, None);
            assert!(op.error.is_some(), "{} should carry an error", state);
        }
    }

    #[test]
    fn test_default_error_kinds() {
        let mut timed_out = op();
        timed_out.transition(OperationState::TimedOut, None);
        assert_eq!(timed_out.error_kind(), Some(ErrorKind::Timeout));

        let mut cancelled = op();
        cancelled.transition(OperationState::Cancelled, None);
        assert_eq!(cancelled.error_kind(), Some(ErrorKind::Cancelled));
    }

    #[test]
    fn test_kind_display_and_serde() {
        assert_eq!(OperationKind::ChangeNetwork.to_string(), "change-network");
        let json = serde_json::to_string(&OperationKind::PowerOff).unwrap();
        assert_eq!(json, "\"power_off\"");
        assert_eq!(OperationId(42).to_string(), "op-42");
    }

    #[test]
    fn test_snapshot_serialization_skips_empty_fields() {
        let op = op();
        let value = serde_json::to_value(&op).unwrap();
        assert!(value.get("error").is_none());
        assert!(value.get("completed_at").is_none());
        assert_eq!(value["state"], "submitted");
        assert_eq!(value["target"], "vm-a");
    }

    mod state_machine {
        use super::*;
        use proptest::prelude::*;

        fn any_state() -> impl Strategy<Value = OperationState> {
            prop_oneof![
                Just(OperationState::Submitted),
                Just(OperationState::Running),
                Just(OperationState::Succeeded),
                Just(OperationState::Failed),
                Just(OperationState::TimedOut),
                Just(OperationState::Cancelled),
            ]
        }

        proptest! {
            #[test]
            fn terminal_state_is_final(steps in prop::collection::vec(any_state(), 0..24)) {
                let mut op = op();
                let mut terminal: Option<(OperationState, Option<DateTime<Utc>>)> = None;

                for next in steps {
                    let before = op.state;
                    let applied = op.transition(next, None);

                    if let Some((state, completed_at)) = terminal {
                        prop_assert!(!applied);
                        prop_assert_eq!(op.state, state);
                        prop_assert_eq!(op.completed_at, completed_at);
                    } else if applied {
                        prop_assert!(before.can_transition_to(next));
                        if next.is_terminal() {
                            prop_assert!(op.completed_at.is_some());
                            prop_assert_eq!(op.error.is_some(), next != OperationState::Succeeded);
                            terminal = Some((next, op.completed_at));
                        }
                    } else {
                        prop_assert_eq!(op.state, before);
                    }
                }
            }
        }
    }
}
