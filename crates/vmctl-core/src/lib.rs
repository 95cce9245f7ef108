//! # vmctl-core
//!
//! Engine layer behind the `vmctl` CLI: it starts lifecycle actions on
//! virtual machines, tracks each one to a terminal state, and aggregates
//! per-target outcomes for batch requests.
//!
//! ## Layers
//!
//! - **Tracking** ([`OperationTracker`]): submit a remote action, then wait
//!   for it with a bounded, suspendable poll loop. Timeouts, transport
//!   retries and cancellation all end in one of the terminal states.
//! - **Batching** ([`BatchExecutor`]): one action over many targets with a
//!   concurrency cap and an optional shared rate limit. Failures are data
//!   in the [`BatchResult`], never raised.
//! - **Collaborators** ([`remote`]): the directory, invoker and handle
//!   traits the engine is written against. [`sim::SimulatedFleet`] is the
//!   in-process implementation the CLI drives.
//! - **Config** ([`config`]): named profiles in TOML with per-profile
//!   tracking settings.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vmctl_core::sim::{SimulatedFleet, SimulatedVm};
//! use vmctl_core::{
//!     ActionParams, BatchExecutor, BatchOptions, LifecycleRules, OperationKind,
//!     OperationTracker, PowerState,
//! };
//!
//! # async fn example() -> vmctl_core::Result<()> {
//! let fleet = Arc::new(SimulatedFleet::new(vec![
//!     SimulatedVm::new("web-01", PowerState::PoweredOff),
//!     SimulatedVm::new("web-02", PowerState::PoweredOn),
//! ]));
//! let executor = BatchExecutor::new(OperationTracker::new(), BatchOptions::default());
//! let rules = LifecycleRules::new(fleet.clone(), OperationKind::PowerOn, ActionParams::None);
//!
//! let targets = vec!["web-01".to_string(), "web-02".to_string()];
//! let result = executor
//!     .execute(
//!         &targets,
//!         OperationKind::PowerOn,
//!         &ActionParams::None,
//!         &rules,
//!         &fleet.action(OperationKind::PowerOn),
//!     )
//!     .await?;
//! assert!(result.is_complete_success());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod batch;
pub mod config;
pub mod error;
pub mod executor;
pub mod limiter;
pub mod operation;
pub mod policy;
pub mod precondition;
pub mod progress;
pub mod remote;
pub mod session;
pub mod sim;
pub mod tracker;
pub mod vm;

pub use audit::{AuditRecord, AuditSink, JsonLinesAuditLog, MemoryAuditLog};
pub use batch::{BatchResult, BatchSummary};
pub use error::{CoreError, ErrorKind, OperationError, PollError, Result};
pub use executor::{BatchExecutor, BatchOptions};
pub use limiter::SubmissionLimiter;
pub use operation::{OperationId, OperationKind, OperationState, RemoteOperation};
pub use policy::{PollPolicy, RetryPolicy};
pub use precondition::{Always, LifecycleRules, Precondition, PreconditionCheck};
pub use progress::{ProgressCallback, ProgressEvent};
pub use remote::{
    ActionInvoker, ActionParams, OperationHandle, RemoteStatus, ResourceDirectory, TargetFilter,
};
pub use session::Session;
pub use tracker::{OperationTracker, TrackerStatus};
pub use vm::{PowerState, VmSummary};
