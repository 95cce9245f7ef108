//! Batch execution of one action over a set of targets
//!
//! Every target is processed independently: a precondition violation,
//! submission failure, remote failure or timeout on one target never stops
//! the others. At most `max_concurrency` targets are in flight at once and
//! all submissions share one rate limiter. [`BatchExecutor::stop`] cancels
//! what is in flight and keeps the rest from being submitted.

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::batch::BatchResult;
use crate::error::{CoreError, Result};
use crate::limiter::SubmissionLimiter;
use crate::operation::{OperationKind, RemoteOperation};
use crate::policy::PollPolicy;
use crate::precondition::{Precondition, PreconditionCheck};
use crate::remote::{ActionInvoker, ActionParams};
use crate::tracker::OperationTracker;

/// Knobs for one executor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    /// Deadline for each target's operation
    pub timeout: Duration,
    pub poll: PollPolicy,
    pub max_concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll: PollPolicy::default(),
            max_concurrency: 10,
        }
    }
}

#[derive(Clone)]
pub struct BatchExecutor {
    tracker: OperationTracker,
    options: BatchOptions,
    limiter: Option<Arc<SubmissionLimiter>>,
    stop: Arc<watch::Sender<bool>>,
}

impl BatchExecutor {
    pub fn new(tracker: OperationTracker, options: BatchOptions) -> Self {
        Self {
            tracker,
            options,
            limiter: None,
            stop: Arc::new(watch::channel(false).0),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<SubmissionLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    pub fn options(&self) -> BatchOptions {
        self.options
    }

    /// Stop a running batch
    ///
    /// Operations in flight are cancelled and targets not yet submitted are
    /// recorded as cancelled without invoking anything. Every target still
    /// gets an outcome. Remote actions already started may still complete.
    pub async fn stop(&self) {
        self.stop.send_replace(true);
        let cancelled = self.tracker.cancel_active().await;
        warn!("Batch stopped; cancelled {} operations in flight", cancelled.len());
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Apply `kind` to every target and collect one outcome per target
    ///
    /// Only a malformed target set (empty, blank or duplicate identifiers)
    /// is raised; every per-target problem is captured in its outcome.
    #[instrument(skip_all, fields(kind = %kind, targets = targets.len()))]
    pub async fn execute(
        &self,
        targets: &[String],
        kind: OperationKind,
        params: &ActionParams,
        precondition: &dyn Precondition,
        invoker: &dyn ActionInvoker,
    ) -> Result<BatchResult> {
        validate_targets(targets)?;
        info!(
            "Running {} on {} targets (concurrency {})",
            kind.verb(),
            targets.len(),
            self.options.max_concurrency
        );

        let mut finished: HashMap<String, RemoteOperation> = stream::iter(targets)
            .map(|target| self.run_one(target, kind, params, precondition, invoker))
            .buffer_unordered(self.options.max_concurrency.max(1))
            .map(|op| (op.target.clone(), op))
            .collect()
            .await;

        let outcomes = targets
            .iter()
            .filter_map(|t| finished.remove(t))
            .collect::<Vec<_>>();

        let result = BatchResult { kind, outcomes };
        let summary = result.summary();
        info!(
            "{} finished: {} succeeded ({} skipped), {} failed, {} timed out, {} cancelled",
            kind.verb(),
            summary.succeeded,
            summary.skipped,
            summary.failed,
            summary.timed_out,
            summary.cancelled
        );
        Ok(result)
    }

    async fn run_one(
        &self,
        target: &str,
        kind: OperationKind,
        params: &ActionParams,
        precondition: &dyn Precondition,
        invoker: &dyn ActionInvoker,
    ) -> RemoteOperation {
        if self.is_stopped() {
            return self.tracker.abandon(target, kind).await;
        }

        match precondition.check(target).await {
            PreconditionCheck::Violated(reason) => {
                return self.tracker.reject(target, kind, reason).await;
            }
            PreconditionCheck::AlreadySatisfied(reason) => {
                return self.tracker.skip(target, kind, reason).await;
            }
            PreconditionCheck::Satisfied => {}
        }

        if let Some(limiter) = &self.limiter {
            debug!("Waiting for submission slot for {}", target);
            let mut stopped = self.stop.subscribe();
            tokio::select! {
                _ = limiter.acquire() => {}
                _ = stopped.wait_for(|stop| *stop) => {}
            }
        }
        if self.is_stopped() {
            return self.tracker.abandon(target, kind).await;
        }

        let op = self
            .tracker
            .submit_action(invoker, target, kind, params)
            .await;
        if op.is_terminal() {
            return op;
        }
        if self.is_stopped() {
            // submitted while stop() was collecting in-flight operations
            if let Ok(cancelled) = self.tracker.cancel(op.id).await {
                return cancelled;
            }
        }
        self.tracker
            .await_completion(&op, self.options.timeout, self.options.poll)
            .await
    }
}

fn validate_targets(targets: &[String]) -> Result<()> {
    if targets.is_empty() {
        return Err(CoreError::InvalidTargetSet("no targets given".to_string()));
    }
    let mut seen = HashSet::with_capacity(targets.len());
    for target in targets {
        if target.trim().is_empty() {
            return Err(CoreError::InvalidTargetSet(
                "blank target identifier".to_string(),
            ));
        }
        if !seen.insert(target.as_str()) {
            return Err(CoreError::InvalidTargetSet(format!(
                "duplicate target '{}'",
                target
            )));
        }
    }
    Ok(())
}
