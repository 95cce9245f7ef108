//! Virtual machine inventory types

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::PoweredOn => "poweredOn",
            PowerState::PoweredOff => "poweredOff",
            PowerState::Suspended => "suspended",
        };
        write!(f, "{}", s)
    }
}

/// Listing view of one VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSummary {
    pub name: String,
    pub power_state: PowerState,
    pub cpus: u32,
    pub memory_mb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<String>,
}

impl VmSummary {
    pub fn memory_gb(&self) -> f64 {
        self.memory_mb as f64 / 1024.0
    }

    /// IP address or `N/A` when the guest reports none
    pub fn display_ip(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("N/A")
    }

    pub fn has_snapshot(&self, name: &str) -> bool {
        self.snapshots.iter().any(|s| s == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> VmSummary {
        VmSummary {
            name: "web-01".to_string(),
            power_state: PowerState::PoweredOn,
            cpus: 2,
            memory_mb: 3072,
            ip_address: None,
            network: Some("VM Network".to_string()),
            snapshots: vec!["baseline".to_string()],
        }
    }

    #[test]
    fn test_memory_gb() {
        assert_eq!(summary().memory_gb(), 3.0);
    }

    #[test]
    fn test_display_ip_fallback() {
        let mut vm = summary();
        assert_eq!(vm.display_ip(), "N/A");
        vm.ip_address = Some("10.0.0.5".to_string());
        assert_eq!(vm.display_ip(), "10.0.0.5");
    }

    #[test]
    fn test_power_state_display() {
        assert_eq!(PowerState::PoweredOff.to_string(), "poweredOff");
        assert_eq!(
            serde_json::to_string(&PowerState::PoweredOn).unwrap(),
            "\"powered_on\""
        );
    }

    #[test]
    fn test_has_snapshot() {
        assert!(summary().has_snapshot("baseline"));
        assert!(!summary().has_snapshot("nightly"));
    }
}
