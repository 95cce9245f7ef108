//! Collaborator abstractions supplied by the surrounding program
//!
//! The tracker and executor never talk to a management server directly.
//! They see a [`ResourceDirectory`] to resolve targets, an [`ActionInvoker`]
//! to start actions, and the [`OperationHandle`] each invocation returns.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, OperationError, PollError, Result};
use crate::operation::OperationKind;
use crate::vm::{PowerState, VmSummary};

/// Status reported by the remote system for one handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Accepted but not started yet
    Queued,
    Running,
    Succeeded,
    /// Remote failure with the payload exactly as reported
    Failed(String),
}

impl RemoteStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Succeeded | RemoteStatus::Failed(_))
    }
}

/// Pollable handle for an action started on the remote system
#[async_trait]
pub trait OperationHandle: Send + Sync {
    /// Opaque identifier assigned by the remote system
    fn id(&self) -> String;

    /// Fetch the current status; `Err` means the status could not be observed
    async fn poll(&self) -> std::result::Result<RemoteStatus, PollError>;
}

/// Per-action parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionParams {
    #[default]
    None,
    Snapshot {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
    Revert {
        snapshot: String,
    },
    Reconfigure {
        #[serde(default)]
        cpus: Option<u32>,
        #[serde(default)]
        memory_mb: Option<u64>,
    },
    ChangeNetwork {
        network: String,
    },
}

impl ActionParams {
    /// Whether these parameters carry what `kind` needs
    pub fn fits(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::PowerOn | OperationKind::PowerOff | OperationKind::Delete => true,
            OperationKind::Snapshot => matches!(self, ActionParams::Snapshot { .. }),
            OperationKind::Revert => matches!(self, ActionParams::Revert { .. }),
            OperationKind::Reconfigure => matches!(self, ActionParams::Reconfigure { .. }),
            OperationKind::ChangeNetwork => matches!(self, ActionParams::ChangeNetwork { .. }),
        }
    }
}

/// Starts remote actions
///
/// Implementations receive an explicit session through their own
/// construction; no ambient connection state is assumed.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    async fn invoke(
        &self,
        target: &str,
        params: &ActionParams,
    ) -> std::result::Result<Box<dyn OperationHandle>, OperationError>;
}

/// Selects targets by name
#[derive(Debug, Clone)]
pub enum TargetFilter {
    All,
    /// Case-insensitive regular expression matched anywhere in the name
    Pattern(Regex),
}

impl TargetFilter {
    /// Build a filter from optional user input; empty input selects everything
    pub fn parse(pattern: Option<&str>) -> Result<Self> {
        match pattern.map(str::trim) {
            None | Some("") => Ok(TargetFilter::All),
            Some(p) => RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map(TargetFilter::Pattern)
                .map_err(|source| CoreError::InvalidFilter {
                    pattern: p.to_string(),
                    source,
                }),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            TargetFilter::All => true,
            TargetFilter::Pattern(re) => re.is_match(name),
        }
    }
}

/// Inventory lookups
#[async_trait]
pub trait ResourceDirectory: Send + Sync {
    /// Summaries of every VM matching the filter, sorted by name
    async fn describe(&self, filter: &TargetFilter) -> Result<Vec<VmSummary>>;

    /// Identifiers of every VM matching the filter
    async fn find(&self, filter: &TargetFilter) -> Result<Vec<String>> {
        Ok(self
            .describe(filter)
            .await?
            .into_iter()
            .map(|vm| vm.name)
            .collect())
    }

    /// Summary of one VM, if it exists
    async fn lookup(&self, name: &str) -> Result<Option<VmSummary>> {
        Ok(self
            .describe(&TargetFilter::All)
            .await?
            .into_iter()
            .find(|vm| vm.name == name))
    }

    async fn power_state(&self, name: &str) -> Result<Option<PowerState>> {
        Ok(self.lookup(name).await?.map(|vm| vm.power_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_empty_matches_all() {
        let filter = TargetFilter::parse(None).unwrap();
        assert!(filter.matches("anything"));
        let filter = TargetFilter::parse(Some("  ")).unwrap();
        assert!(matches!(filter, TargetFilter::All));
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        let filter = TargetFilter::parse(Some("web")).unwrap();
        assert!(filter.matches("prod-WEB-01"));
        assert!(filter.matches("web"));
        assert!(!filter.matches("db-01"));
    }

    #[test]
    fn test_filter_regex() {
        let filter = TargetFilter::parse(Some("^db-0[12]$")).unwrap();
        assert!(filter.matches("db-01"));
        assert!(!filter.matches("db-03"));
    }

    #[test]
    fn test_invalid_filter() {
        let err = TargetFilter::parse(Some("web[")).unwrap_err();
        assert!(err.is_bad_request());
        assert!(err.to_string().contains("web["));
    }

    #[test]
    fn test_action_params_serde() {
        let params = ActionParams::Reconfigure {
            cpus: Some(4),
            memory_mb: None,
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["action"], "reconfigure");
        assert_eq!(json["cpus"], 4);
    }

    #[test]
    fn test_params_fit_kind() {
        assert!(ActionParams::None.fits(OperationKind::PowerOn));
        assert!(!ActionParams::None.fits(OperationKind::Revert));
        let revert = ActionParams::Revert {
            snapshot: "baseline".to_string(),
        };
        assert!(revert.fits(OperationKind::Revert));
        assert!(!revert.fits(OperationKind::Snapshot));
    }

    #[test]
    fn test_remote_status_terminal() {
        assert!(RemoteStatus::Succeeded.is_terminal());
        assert!(RemoteStatus::Failed("x".to_string()).is_terminal());
        assert!(!RemoteStatus::Queued.is_terminal());
        assert!(!RemoteStatus::Running.is_terminal());
    }
}
