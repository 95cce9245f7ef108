//! Operation tracking for long-running remote actions
//!
//! The tracker turns a submitted remote action into a terminal result
//! without blocking the caller's thread. Each wait is a suspendable task:
//! polling sleeps between attempts, is bounded by a mandatory timeout, and
//! wakes early when the operation is cancelled.
//!
//! # Key Features
//!
//! - **Bounded waits**: every `await_completion` has a deadline; a missed
//!   deadline yields `TimedOut` and leaves the remote action running
//! - **Backoff polling**: intervals grow from 200ms to 5s by default
//! - **Transport retries**: a bounded number of consecutive poll failures is
//!   tolerated before the operation is marked `Failed` / tracking lost
//! - **Cancellation**: stops local tracking only; the remote side effect may
//!   still happen
//!
//! # Usage
//!
//! ```ignore
//! let tracker = OperationTracker::new();
//! let op = tracker
//!     .submit("web-01", OperationKind::PowerOn, || invoker.invoke("web-01", &params))
//!     .await;
//! let done = tracker
//!     .await_completion(&op, Duration::from_secs(300), PollPolicy::default())
//!     .await;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditRecord, AuditSink};
use crate::error::{CoreError, ErrorKind, OperationError, Result};
use crate::operation::{OperationId, OperationKind, OperationState, RemoteOperation};
use crate::policy::{PollPolicy, RetryPolicy};
use crate::progress::{ProgressCallback, ProgressEvent, emit};
use crate::remote::{ActionInvoker, ActionParams, OperationHandle, RemoteStatus};

struct TrackedOperation {
    op: RemoteOperation,
    handle: Option<Arc<dyn OperationHandle>>,
    cancel: watch::Sender<bool>,
}

/// Status summary of everything the tracker currently holds
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TrackerStatus {
    pub total: usize,
    pub active: usize,
    pub by_state: HashMap<OperationState, usize>,
}

pub struct OperationTracker {
    operations: Arc<RwLock<HashMap<OperationId, TrackedOperation>>>,
    next_id: Arc<AtomicU64>,
    retry: RetryPolicy,
    audit: Option<Arc<dyn AuditSink>>,
    on_progress: Option<ProgressCallback>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self {
            operations: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            retry: RetryPolicy::default(),
            audit: None,
            on_progress: None,
        }
    }

    /// Set how poll transport failures are retried
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Record every terminal transition to an audit sink
    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Start a remote action
    ///
    /// `invoke` performs the actual remote call. If it fails, the returned
    /// operation is already `Failed` with a submission error; nothing is
    /// raised to the caller.
    #[instrument(skip_all, fields(vm = %target, kind = %kind))]
    pub async fn submit<F, Fut>(
        &self,
        target: &str,
        kind: OperationKind,
        invoke: F,
    ) -> RemoteOperation
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Box<dyn OperationHandle>, OperationError>>,
    {
        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut op = RemoteOperation::new(id, target, kind);
        let (cancel, _) = watch::channel(false);

        match invoke().await {
            Ok(handle) => {
                let handle: Arc<dyn OperationHandle> = Arc::from(handle);
                op.handle = Some(handle.id());
                op.transition(OperationState::Running, None);
                info!(
                    "Submitted {} on {} ({}, remote handle {})",
                    kind.verb(),
                    target,
                    id,
                    handle.id()
                );

                self.operations.write().await.insert(
                    id,
                    TrackedOperation {
                        op: op.clone(),
                        handle: Some(handle),
                        cancel,
                    },
                );

                emit(
                    &self.on_progress,
                    ProgressEvent::Started {
                        id,
                        target: target.to_string(),
                        kind,
                    },
                );
                op
            }
            Err(e) => {
                warn!("Failed to submit {} on {}: {}", kind.verb(), target, e);
                let error = if e.is_submission() {
                    e
                } else {
                    OperationError::submission(e.to_string())
                };
                op.transition(OperationState::Failed, Some(error));

                self.operations.write().await.insert(
                    id,
                    TrackedOperation {
                        op: op.clone(),
                        handle: None,
                        cancel,
                    },
                );
                self.finished(&op);
                op
            }
        }
    }

    /// Start an action through an [`ActionInvoker`]
    pub async fn submit_action(
        &self,
        invoker: &dyn ActionInvoker,
        target: &str,
        kind: OperationKind,
        params: &ActionParams,
    ) -> RemoteOperation {
        self.submit(target, kind, || invoker.invoke(target, params))
            .await
    }

    /// Wait for an operation to reach a terminal state
    ///
    /// Suspends only the calling task. Returns `TimedOut` if `timeout`
    /// elapses first; a zero timeout never polls. Calling this on a terminal
    /// operation returns the stored snapshot without side effects.
    ///
    /// An operation this tracker does not hold is never polled: it comes back
    /// `TimedOut` for a zero timeout and `Failed` with tracking lost otherwise.
    #[instrument(skip_all, fields(id = %operation.id, vm = %operation.target))]
    pub async fn await_completion(
        &self,
        operation: &RemoteOperation,
        timeout: Duration,
        poll: PollPolicy,
    ) -> RemoteOperation {
        let id = operation.id;

        let (handle, mut cancelled) = {
            let operations = self.operations.read().await;
            let Some(entry) = operations.get(&id) else {
                return untracked(operation, timeout);
            };
            if entry.op.is_terminal() {
                return entry.op.clone();
            }
            match &entry.handle {
                Some(handle) => (handle.clone(), entry.cancel.subscribe()),
                None => return entry.op.clone(),
            }
        };

        let start = Instant::now();
        let deadline = start
            .checked_add(timeout)
            .unwrap_or_else(|| start + Duration::from_secs(365 * 24 * 3600));
        let mut polls: u32 = 0;
        let mut failures: u32 = 0;

        loop {
            match self.snapshot(id).await {
                Some(current) if current.is_terminal() => return current,
                Some(_) => {}
                None => return lost(operation, RECORD_DROPPED),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.timed_out(operation, timeout).await;
            }

            let polled = tokio::select! {
                r = tokio::time::timeout(remaining, handle.poll()) => r,
                _ = wait_cancelled(&mut cancelled) => {
                    return self.cancelled_outcome(operation).await;
                }
            };

            let wait = match polled {
                Err(_) => return self.timed_out(operation, timeout).await,
                Ok(Ok(status)) => {
                    failures = 0;
                    match status {
                        RemoteStatus::Succeeded => {
                            return self
                                .finish(operation, OperationState::Succeeded, None)
                                .await;
                        }
                        RemoteStatus::Failed(payload) => {
                            return self
                                .finish(
                                    operation,
                                    OperationState::Failed,
                                    Some(OperationError::remote(payload)),
                                )
                                .await;
                        }
                        pending => {
                            let status = if pending == RemoteStatus::Queued {
                                "queued"
                            } else {
                                "running"
                            };
                            debug!("{} still {} after {:?}", id, status, start.elapsed());
                            emit(
                                &self.on_progress,
                                ProgressEvent::Polling {
                                    id,
                                    target: operation.target.clone(),
                                    status: status.to_string(),
                                    elapsed: start.elapsed(),
                                },
                            );
                            let wait = poll.interval(polls);
                            polls = polls.saturating_add(1);
                            wait
                        }
                    }
                }
                Ok(Err(e)) => {
                    failures += 1;
                    if failures > self.retry.max_attempts {
                        let error = OperationError::new(
                            ErrorKind::TrackingLost,
                            format!(
                                "status unavailable after {} consecutive poll failures: {}",
                                failures, e.0
                            ),
                        );
                        return self
                            .finish(operation, OperationState::Failed, Some(error))
                            .await;
                    }
                    warn!(
                        "Poll of {} failed (attempt {}/{}): {}",
                        id, failures, self.retry.max_attempts, e
                    );
                    emit(
                        &self.on_progress,
                        ProgressEvent::Retrying {
                            id,
                            target: operation.target.clone(),
                            attempt: failures,
                            error: e.0.clone(),
                        },
                    );
                    self.retry.delay(failures)
                }
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::select! {
                _ = tokio::time::sleep(wait.min(remaining)) => {}
                _ = wait_cancelled(&mut cancelled) => {
                    return self.cancelled_outcome(operation).await;
                }
            }
        }
    }

    /// Record a target that failed its precondition; the action is never invoked
    pub async fn reject(
        &self,
        target: &str,
        kind: OperationKind,
        reason: impl Into<String>,
    ) -> RemoteOperation {
        self.record_without_submit(
            target,
            kind,
            OperationState::Failed,
            Some(OperationError::precondition(reason)),
            None,
        )
        .await
    }

    /// Record a target that is already in the desired state as succeeded
    pub async fn skip(
        &self,
        target: &str,
        kind: OperationKind,
        reason: impl Into<String>,
    ) -> RemoteOperation {
        self.record_without_submit(target, kind, OperationState::Succeeded, None, Some(reason.into()))
            .await
    }

    /// Submit and wait in one call
    pub async fn track<F, Fut>(
        &self,
        target: &str,
        kind: OperationKind,
        invoke: F,
        timeout: Duration,
        poll: PollPolicy,
    ) -> RemoteOperation
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Box<dyn OperationHandle>, OperationError>>,
    {
        let op = self.submit(target, kind, invoke).await;
        if op.is_terminal() {
            return op;
        }
        self.await_completion(&op, timeout, poll).await
    }

    /// Stop tracking an operation and mark it `Cancelled`
    ///
    /// Only the local record changes; the remote action is not stopped and
    /// may still complete. Cancelling a terminal operation returns it as is.
    pub async fn cancel(&self, id: OperationId) -> Result<RemoteOperation> {
        let snapshot = {
            let mut operations = self.operations.write().await;
            let entry = operations
                .get_mut(&id)
                .ok_or(CoreError::OperationNotFound(id.0))?;

            if entry.op.is_terminal() {
                return Ok(entry.op.clone());
            }

            entry
                .op
                .transition(OperationState::Cancelled, Some(cancelled_error()));
            entry.cancel.send_replace(true);
            entry.op.clone()
        };

        warn!(
            "Cancelled tracking of {} on {} ({})",
            snapshot.kind.verb(),
            snapshot.target,
            id
        );
        self.finished(&snapshot);
        Ok(snapshot)
    }

    /// Cancel every operation that is still in flight
    pub async fn cancel_active(&self) -> Vec<RemoteOperation> {
        let ids: Vec<OperationId> = self
            .operations
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.op.is_terminal())
            .map(|(id, _)| *id)
            .collect();

        let mut cancelled = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(op) = self.cancel(id).await
                && op.state == OperationState::Cancelled
            {
                cancelled.push(op);
            }
        }
        cancelled
    }

    /// Record a target whose action was never started because the batch stopped
    pub async fn abandon(&self, target: &str, kind: OperationKind) -> RemoteOperation {
        self.record_without_submit(
            target,
            kind,
            OperationState::Cancelled,
            Some(OperationError::new(
                ErrorKind::Cancelled,
                "batch stopped before this action was submitted",
            )),
            None,
        )
        .await
    }

    pub async fn snapshot(&self, id: OperationId) -> Option<RemoteOperation> {
        self.operations.read().await.get(&id).map(|e| e.op.clone())
    }

    /// All tracked operations ordered by id
    pub async fn operations(&self) -> Vec<RemoteOperation> {
        let operations = self.operations.read().await;
        let mut ops: Vec<RemoteOperation> = operations.values().map(|e| e.op.clone()).collect();
        ops.sort_by_key(|op| op.id);
        ops
    }

    pub async fn active_count(&self) -> usize {
        self.operations
            .read()
            .await
            .values()
            .filter(|e| !e.op.is_terminal())
            .count()
    }

    pub async fn status(&self) -> TrackerStatus {
        let operations = self.operations.read().await;
        let mut status = TrackerStatus {
            total: operations.len(),
            ..Default::default()
        };
        for entry in operations.values() {
            if !entry.op.is_terminal() {
                status.active += 1;
            }
            *status.by_state.entry(entry.op.state).or_insert(0) += 1;
        }
        status
    }

    /// Forget terminal operations; returns how many were dropped
    ///
    /// Records that a waiter is still following are kept until it returns.
    pub async fn cleanup_terminal(&self) -> usize {
        let mut operations = self.operations.write().await;
        let before = operations.len();
        operations
            .retain(|_, entry| !entry.op.is_terminal() || entry.cancel.receiver_count() > 0);
        let removed = before - operations.len();
        if removed > 0 {
            debug!("Dropped {} finished operations from tracker", removed);
        }
        removed
    }

    async fn record_without_submit(
        &self,
        target: &str,
        kind: OperationKind,
        state: OperationState,
        error: Option<OperationError>,
        skip_reason: Option<String>,
    ) -> RemoteOperation {
        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut op = RemoteOperation::new(id, target, kind);
        op.skip_reason = skip_reason;
        op.transition(state, error);

        let (cancel, _) = watch::channel(false);
        self.operations.write().await.insert(
            id,
            TrackedOperation {
                op: op.clone(),
                handle: None,
                cancel,
            },
        );
        self.finished(&op);
        op
    }

    async fn timed_out(&self, operation: &RemoteOperation, timeout: Duration) -> RemoteOperation {
        self.finish(operation, OperationState::TimedOut, Some(timeout_error(timeout)))
            .await
    }

    async fn cancelled_outcome(&self, operation: &RemoteOperation) -> RemoteOperation {
        match self.snapshot(operation.id).await {
            Some(current) => current,
            None => {
                let mut op = operation.clone();
                op.transition(OperationState::Cancelled, Some(cancelled_error()));
                op
            }
        }
    }

    async fn finish(
        &self,
        operation: &RemoteOperation,
        state: OperationState,
        error: Option<OperationError>,
    ) -> RemoteOperation {
        let (snapshot, changed) = {
            let mut operations = self.operations.write().await;
            match operations.get_mut(&operation.id) {
                Some(entry) => {
                    let changed = entry.op.transition(state, error);
                    (entry.op.clone(), changed)
                }
                None => (lost(operation, RECORD_DROPPED), false),
            }
        };

        if changed {
            self.finished(&snapshot);
        }
        snapshot
    }

    /// Log, audit and announce a terminal transition
    fn finished(&self, op: &RemoteOperation) {
        match &op.error {
            None => match &op.skip_reason {
                Some(reason) => info!("{} on {} not needed: {}", op.kind.verb(), op.target, reason),
                None => info!("{} on {} succeeded ({})", op.kind.verb(), op.target, op.id),
            },
            Some(e) => warn!(
                "{} on {} ended {} ({}): {}",
                op.kind.verb(),
                op.target,
                op.state,
                op.id,
                e
            ),
        }

        if let Some(sink) = &self.audit
            && let Err(e) = sink.record(&AuditRecord::from(op))
        {
            warn!("Failed to write audit record for {}: {}", op.id, e);
        }

        emit(&self.on_progress, ProgressEvent::Finished(op.clone()));
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for OperationTracker {
    fn clone(&self) -> Self {
        Self {
            operations: self.operations.clone(),
            next_id: self.next_id.clone(),
            retry: self.retry,
            audit: self.audit.clone(),
            on_progress: self.on_progress.clone(),
        }
    }
}

const RECORD_DROPPED: &str = "operation record was dropped while being tracked";

fn cancelled_error() -> OperationError {
    OperationError::new(
        ErrorKind::Cancelled,
        "tracking cancelled by caller; the remote action may still complete",
    )
}

fn timeout_error(timeout: Duration) -> OperationError {
    OperationError::new(
        ErrorKind::Timeout,
        format!(
            "no terminal state within {:?}; the remote action may still be running",
            timeout
        ),
    )
}

/// Terminal copy of the caller's record for an operation no longer held here
fn lost(operation: &RemoteOperation, reason: &str) -> RemoteOperation {
    let mut op = operation.clone();
    op.transition(
        OperationState::Failed,
        Some(OperationError::new(ErrorKind::TrackingLost, reason)),
    );
    op
}

fn untracked(operation: &RemoteOperation, timeout: Duration) -> RemoteOperation {
    if operation.is_terminal() {
        return operation.clone();
    }
    warn!("Operation {} is not tracked here", operation.id);
    if timeout.is_zero() {
        let mut op = operation.clone();
        op.transition(OperationState::TimedOut, Some(timeout_error(timeout)));
        op
    } else {
        lost(operation, "operation is not tracked by this tracker")
    }
}

/// Resolves once cancellation is signalled; never resolves if the sender is gone
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
