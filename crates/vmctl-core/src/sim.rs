//! Simulated VM fleet
//!
//! An in-process stand-in for a management server, loaded from an inventory
//! TOML file. Actions run as tasks that stay in flight for a configurable
//! number of polls and apply their effect when they complete, so the
//! tracker and executor see the same asynchronous shape a real server has.
//!
//! ```toml
//! server = "vcenter.lab.local"
//!
//! [[vm]]
//! name = "web-01"
//! power_state = "powered_on"
//! cpus = 2
//! memory_mb = 4096
//! ip_address = "10.0.0.21"
//! network = "prod"
//! snapshots = ["baseline"]
//! latency_polls = 3     # polls spent running before completion
//! flaky_polls = 1       # transport errors before the first real status
//! fail_with = "vim.fault.NoDiskSpace"  # remote failure payload
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::{CoreError, OperationError, PollError, Result};
use crate::operation::OperationKind;
use crate::remote::{
    ActionInvoker, ActionParams, OperationHandle, RemoteStatus, ResourceDirectory, TargetFilter,
};
use crate::session::Session;
use crate::vm::{PowerState, VmSummary};

fn default_cpus() -> u32 {
    1
}

fn default_memory_mb() -> u64 {
    1024
}

fn default_latency_polls() -> u32 {
    1
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// One VM in the simulated inventory, with its fault injection knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedVm {
    pub name: String,
    pub power_state: PowerState,
    #[serde(default = "default_cpus")]
    pub cpus: u32,
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<String>,
    #[serde(default = "default_latency_polls")]
    pub latency_polls: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub flaky_polls: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_with: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reject_submissions: bool,
}

impl SimulatedVm {
    pub fn new(name: impl Into<String>, power_state: PowerState) -> Self {
        Self {
            name: name.into(),
            power_state,
            cpus: default_cpus(),
            memory_mb: default_memory_mb(),
            ip_address: None,
            network: None,
            snapshots: Vec::new(),
            latency_polls: default_latency_polls(),
            flaky_polls: 0,
            fail_with: None,
            reject_submissions: false,
        }
    }

    pub fn with_resources(mut self, cpus: u32, memory_mb: u64) -> Self {
        self.cpus = cpus;
        self.memory_mb = memory_mb;
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_snapshot(mut self, name: impl Into<String>) -> Self {
        self.snapshots.push(name.into());
        self
    }

    /// Number of polls that report `Running` before the task completes
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    /// Number of polls that fail at the transport level before any status
    pub fn with_flaky_polls(mut self, polls: u32) -> Self {
        self.flaky_polls = polls;
        self
    }

    /// Every task on this VM ends with this remote failure payload
    pub fn failing_with(mut self, payload: impl Into<String>) -> Self {
        self.fail_with = Some(payload.into());
        self
    }

    /// The server refuses to start any task on this VM
    pub fn rejecting_submissions(mut self) -> Self {
        self.reject_submissions = true;
        self
    }

    fn summary(&self) -> VmSummary {
        VmSummary {
            name: self.name.clone(),
            power_state: self.power_state,
            cpus: self.cpus,
            memory_mb: self.memory_mb,
            // Guests only report an address while running
            ip_address: match self.power_state {
                PowerState::PoweredOn => self.ip_address.clone(),
                _ => None,
            },
            network: self.network.clone(),
            snapshots: self.snapshots.clone(),
        }
    }
}

/// On-disk inventory layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, rename = "vm")]
    pub vms: Vec<SimulatedVm>,
}

struct FleetState {
    server: Option<String>,
    vms: BTreeMap<String, SimulatedVm>,
}

/// Shared simulated inventory; clones see the same VMs
#[derive(Clone)]
pub struct SimulatedFleet {
    state: Arc<Mutex<FleetState>>,
    next_task: Arc<AtomicU64>,
    session: Option<Arc<Session>>,
}

impl SimulatedFleet {
    pub fn new(vms: Vec<SimulatedVm>) -> Self {
        Self::from_inventory(Inventory { server: None, vms })
    }

    /// Build from an inventory; later duplicates of a name replace earlier ones
    pub fn from_inventory(inventory: Inventory) -> Self {
        let vms = inventory
            .vms
            .into_iter()
            .map(|vm| (vm.name.clone(), vm))
            .collect();
        Self {
            state: Arc::new(Mutex::new(FleetState {
                server: inventory.server,
                vms,
            })),
            next_task: Arc::new(AtomicU64::new(1)),
            session: None,
        }
    }

    /// Attach the session actions are started under
    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_deref()
    }

    /// Load an inventory TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Inventory(format!("failed to read {}: {}", path.display(), e))
        })?;
        let inventory: Inventory = toml::from_str(&content).map_err(|e| {
            CoreError::Inventory(format!("failed to parse {}: {}", path.display(), e))
        })?;

        let mut seen = std::collections::HashSet::new();
        for vm in &inventory.vms {
            if !seen.insert(vm.name.as_str()) {
                return Err(CoreError::Inventory(format!(
                    "duplicate VM '{}' in {}",
                    vm.name,
                    path.display()
                )));
            }
        }

        debug!(
            "Loaded {} VMs from inventory {}",
            inventory.vms.len(),
            path.display()
        );
        Ok(Self::from_inventory(inventory))
    }

    /// Write the current state back so later invocations see applied effects
    pub fn save(&self, path: &Path) -> Result<()> {
        let inventory = self.inventory();
        let content = toml::to_string_pretty(&inventory).map_err(|e| {
            CoreError::Inventory(format!("failed to serialize inventory: {}", e))
        })?;
        std::fs::write(path, content).map_err(|e| {
            CoreError::Inventory(format!("failed to write {}: {}", path.display(), e))
        })?;
        debug!("Saved inventory to {}", path.display());
        Ok(())
    }

    pub fn inventory(&self) -> Inventory {
        let state = self.lock();
        Inventory {
            server: state.server.clone(),
            vms: state.vms.values().cloned().collect(),
        }
    }

    pub fn server(&self) -> Option<String> {
        self.lock().server.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().vms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().vms.is_empty()
    }

    pub fn vm(&self, name: &str) -> Option<SimulatedVm> {
        self.lock().vms.get(name).cloned()
    }

    /// Invoker for one kind of action against this fleet
    pub fn action(&self, kind: OperationKind) -> FleetAction {
        FleetAction {
            fleet: self.clone(),
            kind,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a finished task's effect, or report why the server refuses it
    fn complete(&self, target: &str, kind: OperationKind, params: &ActionParams) -> RemoteStatus {
        let mut state = self.lock();
        let Some(vm) = state.vms.get_mut(target) else {
            return RemoteStatus::Failed(format!(
                "vim.fault.ManagedObjectNotFound: '{}' no longer exists",
                target
            ));
        };

        if let Some(payload) = &vm.fail_with {
            return RemoteStatus::Failed(payload.clone());
        }

        match (kind, params) {
            (OperationKind::PowerOn, _) => {
                if vm.power_state == PowerState::PoweredOn {
                    return invalid_state(vm);
                }
                vm.power_state = PowerState::PoweredOn;
            }
            (OperationKind::PowerOff, _) => {
                if vm.power_state == PowerState::PoweredOff {
                    return invalid_state(vm);
                }
                vm.power_state = PowerState::PoweredOff;
            }
            (OperationKind::Delete, _) => {
                if vm.power_state != PowerState::PoweredOff {
                    return invalid_state(vm);
                }
                state.vms.remove(target);
            }
            (OperationKind::Snapshot, ActionParams::Snapshot { name, .. }) => {
                if vm.snapshots.contains(name) {
                    return RemoteStatus::Failed(format!(
                        "vim.fault.DuplicateName: snapshot '{}' already exists",
                        name
                    ));
                }
                vm.snapshots.push(name.clone());
            }
            (OperationKind::Revert, ActionParams::Revert { snapshot }) => {
                if !vm.snapshots.contains(snapshot) {
                    return RemoteStatus::Failed(format!(
                        "vim.fault.NotFound: snapshot '{}'",
                        snapshot
                    ));
                }
                // Snapshots taken without memory revert to powered off
                vm.power_state = PowerState::PoweredOff;
            }
            (OperationKind::Reconfigure, ActionParams::Reconfigure { cpus, memory_mb }) => {
                if vm.power_state != PowerState::PoweredOff {
                    return invalid_state(vm);
                }
                if let Some(cpus) = cpus {
                    vm.cpus = *cpus;
                }
                if let Some(memory_mb) = memory_mb {
                    vm.memory_mb = *memory_mb;
                }
            }
            (OperationKind::ChangeNetwork, ActionParams::ChangeNetwork { network }) => {
                vm.network = Some(network.clone());
            }
            _ => {
                return RemoteStatus::Failed(format!(
                    "vim.fault.InvalidArgument: bad parameters for {}",
                    kind.verb()
                ));
            }
        }
        RemoteStatus::Succeeded
    }
}

fn invalid_state(vm: &SimulatedVm) -> RemoteStatus {
    RemoteStatus::Failed(format!(
        "vim.fault.InvalidPowerState: operation not allowed in state {}",
        vm.power_state
    ))
}

#[async_trait]
impl ResourceDirectory for SimulatedFleet {
    async fn describe(&self, filter: &TargetFilter) -> Result<Vec<VmSummary>> {
        Ok(self
            .lock()
            .vms
            .values()
            .filter(|vm| filter.matches(&vm.name))
            .map(SimulatedVm::summary)
            .collect())
    }

    async fn lookup(&self, name: &str) -> Result<Option<VmSummary>> {
        Ok(self.lock().vms.get(name).map(SimulatedVm::summary))
    }
}

/// Starts one kind of action on the simulated fleet
pub struct FleetAction {
    fleet: SimulatedFleet,
    kind: OperationKind,
}

#[async_trait]
impl ActionInvoker for FleetAction {
    async fn invoke(
        &self,
        target: &str,
        params: &ActionParams,
    ) -> std::result::Result<Box<dyn OperationHandle>, OperationError> {
        if !params.fits(self.kind) {
            return Err(OperationError::submission(format!(
                "missing parameters for {}",
                self.kind.verb()
            )));
        }

        let vm = self
            .fleet
            .vm(target)
            .ok_or_else(|| OperationError::submission(format!("VM '{}' not found", target)))?;
        if vm.reject_submissions {
            return Err(OperationError::submission(format!(
                "server refused to start {} on '{}'",
                self.kind.verb(),
                target
            )));
        }

        let task = format!("task-{}", self.fleet.next_task.fetch_add(1, Ordering::Relaxed));
        match self.fleet.session() {
            Some(session) => info!(
                "Simulated {} started on {} as {} by {}",
                self.kind.verb(),
                target,
                task,
                session.principal()
            ),
            None => info!("Simulated {} started on {} as {}", self.kind.verb(), target, task),
        }
        Ok(Box::new(SimulatedTask {
            id: task,
            fleet: self.fleet.clone(),
            target: target.to_string(),
            kind: self.kind,
            params: params.clone(),
            progress: Mutex::new(TaskProgress {
                polls: 0,
                running_left: vm.latency_polls,
                flaky_left: vm.flaky_polls,
                outcome: None,
            }),
        }))
    }
}

struct TaskProgress {
    polls: u32,
    running_left: u32,
    flaky_left: u32,
    outcome: Option<RemoteStatus>,
}

struct SimulatedTask {
    id: String,
    fleet: SimulatedFleet,
    target: String,
    kind: OperationKind,
    params: ActionParams,
    progress: Mutex<TaskProgress>,
}

#[async_trait]
impl OperationHandle for SimulatedTask {
    fn id(&self) -> String {
        self.id.clone()
    }

    async fn poll(&self) -> std::result::Result<RemoteStatus, PollError> {
        let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(outcome) = &progress.outcome {
            return Ok(outcome.clone());
        }
        if progress.flaky_left > 0 {
            progress.flaky_left -= 1;
            return Err(PollError(format!("{}: connection reset by peer", self.id)));
        }

        progress.polls += 1;
        if progress.running_left > 0 {
            progress.running_left -= 1;
            return Ok(if progress.polls == 1 {
                RemoteStatus::Queued
            } else {
                RemoteStatus::Running
            });
        }

        let outcome = self.fleet.complete(&self.target, self.kind, &self.params);
        progress.outcome = Some(outcome.clone());
        Ok(outcome)
    }
}
