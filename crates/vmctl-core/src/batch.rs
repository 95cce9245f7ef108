//! Aggregated outcome of one batch action

use serde::Serialize;

use crate::operation::{OperationKind, OperationState, RemoteOperation};

/// Exactly one terminal outcome per requested target, in request order
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub kind: OperationKind,
    pub outcomes: Vec<RemoteOperation>,
}

/// Per-state counts of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    /// Subset of `succeeded` where the action was not needed
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, target: &str) -> Option<&RemoteOperation> {
        self.outcomes.iter().find(|op| op.target == target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().map(|op| op.target.as_str())
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &RemoteOperation> {
        self.outcomes.iter().filter(|op| op.is_success())
    }

    /// Every outcome that did not succeed
    pub fn failures(&self) -> impl Iterator<Item = &RemoteOperation> {
        self.outcomes.iter().filter(|op| !op.is_success())
    }

    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(RemoteOperation::is_success)
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.outcomes.len(),
            ..Default::default()
        };
        for op in &self.outcomes {
            match op.state {
                OperationState::Succeeded => {
                    summary.succeeded += 1;
                    if op.skip_reason.is_some() {
                        summary.skipped += 1;
                    }
                }
                OperationState::Failed => summary.failed += 1,
                OperationState::TimedOut => summary.timed_out += 1,
                OperationState::Cancelled => summary.cancelled += 1,
                OperationState::Submitted | OperationState::Running => {}
            }
        }
        summary
    }
}
