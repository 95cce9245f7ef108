//! Per-target eligibility checks evaluated before invoking an action

use async_trait::async_trait;
use std::sync::Arc;

use crate::operation::OperationKind;
use crate::remote::{ActionParams, ResourceDirectory};
use crate::vm::PowerState;

/// Result of checking one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionCheck {
    /// Target is eligible; invoke the action
    Satisfied,
    /// Target is already in the desired state; record success without invoking
    AlreadySatisfied(String),
    /// Target is not eligible; record a precondition failure
    Violated(String),
}

#[async_trait]
pub trait Precondition: Send + Sync {
    async fn check(&self, target: &str) -> PreconditionCheck;
}

#[async_trait]
impl<F> Precondition for F
where
    F: Fn(&str) -> PreconditionCheck + Send + Sync,
{
    async fn check(&self, target: &str) -> PreconditionCheck {
        self(target)
    }
}

/// Precondition that always passes
pub struct Always;

#[async_trait]
impl Precondition for Always {
    async fn check(&self, _target: &str) -> PreconditionCheck {
        PreconditionCheck::Satisfied
    }
}

/// Lifecycle rules evaluated against the inventory
///
/// - power on/off short-circuit when the VM is already in that state
/// - reconfigure and delete require the VM to be powered off
/// - revert requires the named snapshot to exist
/// - snapshot refuses to reuse an existing snapshot name
/// - network change short-circuits when already attached to that network
pub struct LifecycleRules {
    directory: Arc<dyn ResourceDirectory>,
    kind: OperationKind,
    params: ActionParams,
}

impl LifecycleRules {
    pub fn new(
        directory: Arc<dyn ResourceDirectory>,
        kind: OperationKind,
        params: ActionParams,
    ) -> Self {
        Self {
            directory,
            kind,
            params,
        }
    }
}

#[async_trait]
impl Precondition for LifecycleRules {
    async fn check(&self, target: &str) -> PreconditionCheck {
        let vm = match self.directory.lookup(target).await {
            Ok(Some(vm)) => vm,
            Ok(None) => {
                return PreconditionCheck::Violated(format!("VM '{}' not found", target));
            }
            Err(e) => {
                return PreconditionCheck::Violated(format!("could not inspect '{}': {}", target, e));
            }
        };

        match (self.kind, &self.params) {
            (OperationKind::PowerOn, _) if vm.power_state == PowerState::PoweredOn => {
                PreconditionCheck::AlreadySatisfied("already powered on".to_string())
            }
            (OperationKind::PowerOff, _) if vm.power_state == PowerState::PoweredOff => {
                PreconditionCheck::AlreadySatisfied("already powered off".to_string())
            }
            (OperationKind::Reconfigure, ActionParams::Reconfigure { cpus, memory_mb }) => {
                if cpus.is_none() && memory_mb.is_none() {
                    PreconditionCheck::Violated("nothing to reconfigure".to_string())
                } else if vm.power_state != PowerState::PoweredOff {
                    PreconditionCheck::Violated(format!(
                        "must be powered off before reconfigure (currently {})",
                        vm.power_state
                    ))
                } else if cpus.is_none_or(|c| c == vm.cpus)
                    && memory_mb.is_none_or(|m| m == vm.memory_mb)
                {
                    PreconditionCheck::AlreadySatisfied("already has requested resources".to_string())
                } else {
                    PreconditionCheck::Satisfied
                }
            }
            (OperationKind::Delete, _) if vm.power_state != PowerState::PoweredOff => {
                PreconditionCheck::Violated(format!(
                    "must be powered off before delete (currently {})",
                    vm.power_state
                ))
            }
            (OperationKind::Revert, ActionParams::Revert { snapshot }) if !vm.has_snapshot(snapshot) => {
                PreconditionCheck::Violated(format!("snapshot '{}' does not exist", snapshot))
            }
            (OperationKind::Snapshot, ActionParams::Snapshot { name, .. }) if vm.has_snapshot(name) => {
                PreconditionCheck::Violated(format!("snapshot '{}' already exists", name))
            }
            (OperationKind::ChangeNetwork, ActionParams::ChangeNetwork { network })
                if vm.network.as_deref() == Some(network.as_str()) =>
            {
                PreconditionCheck::AlreadySatisfied(format!("already on network '{}'", network))
            }
            (OperationKind::Reconfigure, _)
            | (OperationKind::Revert, _)
            | (OperationKind::Snapshot, _)
            | (OperationKind::ChangeNetwork, _)
                if !self.params.fits(self.kind) =>
            {
                PreconditionCheck::Violated(format!("missing parameters for {}", self.kind.verb()))
            }
            _ => PreconditionCheck::Satisfied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimulatedFleet, SimulatedVm};

    fn fleet() -> Arc<SimulatedFleet> {
        Arc::new(SimulatedFleet::new(vec![
            SimulatedVm::new("web-01", PowerState::PoweredOn)
                .with_network("prod")
                .with_snapshot("baseline"),
            SimulatedVm::new("db-01", PowerState::PoweredOff),
        ]))
    }

    async fn check(kind: OperationKind, params: ActionParams, target: &str) -> PreconditionCheck {
        LifecycleRules::new(fleet(), kind, params).check(target).await
    }

    #[tokio::test]
    async fn test_power_on_short_circuits() {
        assert!(matches!(
            check(OperationKind::PowerOn, ActionParams::None, "web-01").await,
            PreconditionCheck::AlreadySatisfied(_)
        ));
        assert_eq!(
            check(OperationKind::PowerOn, ActionParams::None, "db-01").await,
            PreconditionCheck::Satisfied
        );
    }

    #[tokio::test]
    async fn test_power_off_short_circuits() {
        assert!(matches!(
            check(OperationKind::PowerOff, ActionParams::None, "db-01").await,
            PreconditionCheck::AlreadySatisfied(_)
        ));
    }

    #[tokio::test]
    async fn test_reconfigure_requires_powered_off() {
        let params = ActionParams::Reconfigure {
            cpus: Some(8),
            memory_mb: None,
        };
        match check(OperationKind::Reconfigure, params.clone(), "web-01").await {
            PreconditionCheck::Violated(reason) => assert!(reason.contains("powered off")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            check(OperationKind::Reconfigure, params, "db-01").await,
            PreconditionCheck::Satisfied
        );
    }

    #[tokio::test]
    async fn test_reconfigure_without_changes() {
        let params = ActionParams::Reconfigure {
            cpus: None,
            memory_mb: None,
        };
        assert!(matches!(
            check(OperationKind::Reconfigure, params, "db-01").await,
            PreconditionCheck::Violated(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_requires_powered_off() {
        assert!(matches!(
            check(OperationKind::Delete, ActionParams::None, "web-01").await,
            PreconditionCheck::Violated(_)
        ));
        assert_eq!(
            check(OperationKind::Delete, ActionParams::None, "db-01").await,
            PreconditionCheck::Satisfied
        );
    }

    #[tokio::test]
    async fn test_revert_and_snapshot_names() {
        let revert = |s: &str| ActionParams::Revert {
            snapshot: s.to_string(),
        };
        assert_eq!(
            check(OperationKind::Revert, revert("baseline"), "web-01").await,
            PreconditionCheck::Satisfied
        );
        assert!(matches!(
            check(OperationKind::Revert, revert("missing"), "web-01").await,
            PreconditionCheck::Violated(_)
        ));

        let snapshot = ActionParams::Snapshot {
            name: "baseline".to_string(),
            description: None,
        };
        assert!(matches!(
            check(OperationKind::Snapshot, snapshot, "web-01").await,
            PreconditionCheck::Violated(_)
        ));
    }

    #[tokio::test]
    async fn test_network_short_circuit_and_missing_params() {
        let same = ActionParams::ChangeNetwork {
            network: "prod".to_string(),
        };
        assert!(matches!(
            check(OperationKind::ChangeNetwork, same, "web-01").await,
            PreconditionCheck::AlreadySatisfied(_)
        ));
        assert!(matches!(
            check(OperationKind::ChangeNetwork, ActionParams::None, "web-01").await,
            PreconditionCheck::Violated(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_vm_is_violation() {
        match check(OperationKind::PowerOn, ActionParams::None, "ghost").await {
            PreconditionCheck::Violated(reason) => assert!(reason.contains("not found")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closure_precondition() {
        let rule = |target: &str| {
            if target.starts_with("prod") {
                PreconditionCheck::Violated("protected".to_string())
            } else {
                PreconditionCheck::Satisfied
            }
        };
        assert!(matches!(rule.check("prod-1").await, PreconditionCheck::Violated(_)));
        assert_eq!(Always.check("anything").await, PreconditionCheck::Satisfied);
    }
}
