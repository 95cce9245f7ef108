//! Error types for vmctl
//!
//! Structured CLI errors with suggestions, printed cargo-style.

use colored::Colorize;
use thiserror::Error;
use vmctl_core::CoreError;
use vmctl_core::config::ConfigError;

/// Cargo-style diagnostic formatter for CLI errors.
///
/// Produces structured output like:
/// ```text
/// error: Profile 'lab' has no inventory file configured
///
///   tip: point the profile at an inventory file:
///       vmctl profile set lab --endpoint vc01 --username ops --inventory ~/fleet.toml
/// ```
pub struct CliDiagnostic {
    message: String,
    detail: Option<String>,
    tips: Vec<(String, Vec<String>)>,
}

impl CliDiagnostic {
    /// Start a new error diagnostic with the given message.
    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            detail: None,
            tips: Vec::new(),
        }
    }

    /// Add a detail line below the error message.
    pub fn detail(mut self, text: &str) -> Self {
        self.detail = Some(text.to_string());
        self
    }

    /// Add a tip with optional example commands.
    pub fn tip(mut self, description: &str, commands: &[&str]) -> Self {
        self.tips.push((
            description.to_string(),
            commands.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!("{}{}{}", "error".red().bold(), ": ".bold(), self.message);

        if let Some(detail) = &self.detail {
            out.push_str(&format!("\n  {}", detail));
        }

        for (description, commands) in &self.tips {
            out.push_str(&format!(
                "\n\n  {}{}{}",
                "tip".yellow().bold(),
                ": ".bold(),
                description
            ));
            for cmd in commands {
                out.push_str(&format!("\n      {}", cmd));
            }
        }
        out
    }

    /// Print the diagnostic to stderr with colored formatting.
    pub fn print(&self) {
        eprintln!("{}", self.render());
    }
}

/// Main error type for the vmctl application
#[derive(Error, Debug)]
pub enum VmCtlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("No profile configured. Use 'vmctl profile set' to configure a profile.")]
    NoProfileConfigured,

    #[error("Profile '{profile}' has no inventory file configured")]
    NoInventory { profile: String },

    #[error("Inventory error: {message}")]
    Inventory { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("No VMs match '{filter}'")]
    NoMatchingTargets { filter: String },

    #[error("{failed} of {total} targets did not complete '{action}'")]
    BatchIncomplete {
        action: String,
        failed: usize,
        total: usize,
    },

    #[error("File error for '{path}': {message}")]
    FileError { path: String, message: String },

    #[error("Output formatting error: {message}")]
    OutputError { message: String },
}

/// Result type for vmctl operations
pub type Result<T> = std::result::Result<T, VmCtlError>;

impl VmCtlError {
    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            VmCtlError::ProfileNotFound { name } => vec![
                "List available profiles: vmctl profile list".to_string(),
                format!(
                    "Create profile '{}': vmctl profile set {} --endpoint <host> --username <user>",
                    name, name
                ),
                "Check profile name spelling".to_string(),
            ],
            VmCtlError::NoProfileConfigured => vec![
                "Create a profile: vmctl profile set lab --endpoint vcenter.lab.local --username administrator --inventory ~/fleet.toml".to_string(),
                "Point at another config file: vmctl --config-file <path> ...".to_string(),
                "View profile documentation: vmctl profile --help".to_string(),
            ],
            VmCtlError::NoInventory { profile } => vec![
                format!(
                    "Add an inventory to the profile: vmctl profile set {} --endpoint <host> --username <user> --inventory <path>",
                    profile
                ),
                format!("Check profile details: vmctl profile show {}", profile),
            ],
            VmCtlError::Inventory { .. } => vec![
                "Check that the inventory file exists and is valid TOML".to_string(),
                "Every [[vm]] entry needs a unique name and a power_state".to_string(),
            ],
            VmCtlError::InvalidInput { message } if message.contains("regex") || message.contains("filter") => vec![
                "Filters are case-insensitive regular expressions, e.g. '^web-'".to_string(),
                "Escape special characters such as '.' or '('".to_string(),
            ],
            VmCtlError::InvalidInput { .. } => vec![
                "Check the command syntax: vmctl <command> --help".to_string(),
            ],
            VmCtlError::NoMatchingTargets { .. } => vec![
                "List VMs to check names: vmctl vm list".to_string(),
                "Filters are case-insensitive regular expressions".to_string(),
            ],
            VmCtlError::BatchIncomplete { .. } => vec![
                "Rerun with -o json to see the error for every target".to_string(),
                "Raise the per-operation deadline with --timeout <secs>".to_string(),
            ],
            VmCtlError::FileError { path, .. } => vec![
                format!("Check that file exists: {}", path),
                "Verify file permissions are correct".to_string(),
            ],
            _ => vec![],
        }
    }

    /// Cargo-style diagnostic with suggestions as tips
    pub fn diagnostic(&self) -> CliDiagnostic {
        let mut diag = CliDiagnostic::error(&self.to_string());
        if let VmCtlError::Inventory { .. } = self {
            diag = diag.detail("Inventory files are TOML with one [[vm]] table per machine.");
        }
        for suggestion in self.suggestions() {
            diag = diag.tip(&suggestion, &[]);
        }
        diag
    }
}

impl From<serde_json::Error> for VmCtlError {
    fn from(err: serde_json::Error) -> Self {
        VmCtlError::OutputError {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<std::io::Error> for VmCtlError {
    fn from(err: std::io::Error) -> Self {
        VmCtlError::OutputError {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<anyhow::Error> for VmCtlError {
    fn from(err: anyhow::Error) -> Self {
        VmCtlError::Configuration(format!("{:#}", err))
    }
}

impl From<ConfigError> for VmCtlError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name } => VmCtlError::ProfileNotFound { name },
            ConfigError::NoProfiles { .. } => VmCtlError::NoProfileConfigured,
            ConfigError::NoInventory { profile } => VmCtlError::NoInventory { profile },
            other => VmCtlError::Configuration(other.to_string()),
        }
    }
}

impl From<CoreError> for VmCtlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(config_err) => VmCtlError::from(config_err),
            CoreError::Inventory(message) => VmCtlError::Inventory { message },
            CoreError::InvalidFilter { .. } | CoreError::InvalidTargetSet(_) => {
                VmCtlError::InvalidInput {
                    message: err.to_string(),
                }
            }
            CoreError::Audit(io) => VmCtlError::FileError {
                path: "audit log".to_string(),
                message: io.to_string(),
            },
            CoreError::OperationNotFound(_) => VmCtlError::InvalidInput {
                message: err.to_string(),
            },
        }
    }
}
