//! CLI structure and command definitions

use clap::{Args, Parser, Subcommand};
use vmctl_core::PowerState;

/// Virtual machine lifecycle CLI
#[derive(Parser, Debug)]
#[command(name = "vmctl")]
#[command(version, about = "Virtual machine lifecycle CLI with tracked batch actions")]
#[command(long_about = "
Virtual machine lifecycle CLI with tracked batch actions

Every action is submitted per VM and tracked to a terminal state with a
deadline, so one slow or failing machine never holds up the rest.

EXAMPLES:
    # Set up a profile backed by an inventory file
    vmctl profile set lab --endpoint vcenter.lab.local --username administrator \\
        --inventory ~/fleet.toml

    # List VMs whose name starts with web-
    vmctl vm list --filter '^web-'

    # Power on every matching VM, at most 4 at a time
    vmctl vm power-on '^web-' --concurrency 4

    # Machine-readable batch report
    vmctl vm snapshot '^db-' --name pre-patch -o json

For more help on a specific command, run:
    vmctl <command> --help
")]
pub struct Cli {
    /// Profile to use for this command
    #[arg(long, short, global = true, env = "VMCTL_PROFILE")]
    pub profile: Option<String>,

    /// Path to alternate configuration file
    #[arg(long, global = true, env = "VMCTL_CONFIG_FILE")]
    pub config_file: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value = "auto")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub tracking: TrackingArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Per-invocation overrides of the profile's tracking settings
#[derive(Args, Debug, Clone, Default)]
pub struct TrackingArgs {
    /// Per-VM deadline in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// VMs in flight at once
    #[arg(long, global = true, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Limit submissions per minute (enables rate limiting)
    #[arg(long, global = true, value_name = "PER_MINUTE")]
    pub rate_limit: Option<u32>,

    /// Consecutive poll failures tolerated before tracking is lost
    #[arg(long, global = true, value_name = "N")]
    pub retry_attempts: Option<u32>,

    /// Append a JSON line per finished operation to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub audit_log: Option<String>,
}

/// Output format options
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Automatically choose format based on command and context
    Auto,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Human-readable table format
    Table,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the session the active profile opens
    #[command(visible_alias = "sess")]
    Session,

    /// Virtual machine listing and lifecycle actions
    #[command(subcommand)]
    #[command(after_help = "EXAMPLES:
    # List all VMs
    vmctl vm list

    # Power off everything in the test tier
    vmctl vm power-off '^test-'

    # Snapshot, then revert
    vmctl vm snapshot app-01 --name before-upgrade --description 'kernel 6.8'
    vmctl vm revert app-01 --snapshot before-upgrade

    # Resize powered-off VMs
    vmctl vm reconfigure '^batch-' --cpus 8 --memory-mb 32768
")]
    Vm(VmCommands),

    /// Profile management
    #[command(subcommand, visible_alias = "prof", visible_alias = "pr")]
    #[command(after_help = "EXAMPLES:
    # Create a profile
    vmctl profile set lab --endpoint vcenter.lab.local --username administrator \\
        --inventory ~/fleet.toml --default

    # List all profiles
    vmctl profile list

    # Show profile details
    vmctl profile show lab

    # Remove a profile
    vmctl profile remove lab --force
")]
    Profile(ProfileCommands),

    /// Version information
    #[command(visible_alias = "ver", visible_alias = "v")]
    Version,

    /// Generate shell completions
    #[command(visible_alias = "comp")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion generation
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bourne Again Shell
    Bash,
    /// Z Shell
    Zsh,
    /// Friendly Interactive Shell
    Fish,
    /// PowerShell
    #[value(name = "powershell", alias = "power-shell")]
    PowerShell,
    /// Elvish
    Elvish,
}

/// Virtual machine commands
///
/// Actions take a FILTER: a case-insensitive regular expression matched
/// anywhere in the VM name.
#[derive(Subcommand, Debug)]
pub enum VmCommands {
    /// List virtual machines
    #[command(visible_alias = "ls")]
    List {
        /// Only VMs whose name matches this regular expression
        #[arg(long, short)]
        filter: Option<String>,

        /// Only VMs in this power state
        #[arg(long, value_enum)]
        power_state: Option<PowerState>,
    },

    /// Power on matching VMs (already running VMs are left alone)
    #[command(visible_alias = "start")]
    PowerOn {
        filter: String,
    },

    /// Power off matching VMs (already stopped VMs are left alone)
    #[command(visible_alias = "stop")]
    PowerOff {
        filter: String,
    },

    /// Take a snapshot of matching VMs
    Snapshot {
        filter: String,

        /// Snapshot name
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Revert matching VMs to a named snapshot
    Revert {
        filter: String,

        /// Snapshot to revert to
        #[arg(long)]
        snapshot: String,
    },

    /// Change CPU and memory of matching powered-off VMs
    Reconfigure {
        filter: String,

        #[arg(long)]
        cpus: Option<u32>,

        #[arg(long)]
        memory_mb: Option<u64>,
    },

    /// Attach matching VMs to another network
    Network {
        filter: String,

        /// Target network name
        #[arg(long)]
        network: String,
    },

    /// Delete matching powered-off VMs
    #[command(visible_alias = "rm")]
    Delete {
        filter: String,
    },
}

/// Profile management commands
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// List all configured profiles
    #[command(visible_alias = "ls", visible_alias = "l")]
    List,

    /// Show the path to the configuration file
    Path,

    /// Show details of a specific profile
    #[command(visible_alias = "sh", visible_alias = "get")]
    Show {
        /// Profile name to show
        name: String,
    },

    /// Set or create a profile
    #[command(visible_alias = "add", visible_alias = "create")]
    #[command(after_help = "EXAMPLES:
    # Lab vCenter backed by a local inventory
    vmctl profile set lab --endpoint vcenter.lab.local \\
        --username administrator@vsphere.local \\
        --inventory ~/fleet.toml

    # Self-signed certificate, password taken from VMCTL_PASSWORD
    vmctl profile set staging --endpoint https://vc-staging:443 \\
        --username ops --insecure --inventory /srv/staging.toml --default
")]
    Set {
        /// Profile name
        name: String,

        /// Management server host or URL
        #[arg(long)]
        endpoint: String,

        #[arg(long)]
        username: String,

        /// Stored in the config file; prefer VMCTL_PASSWORD
        #[arg(long)]
        password: Option<String>,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,

        /// Inventory file backing the fleet
        #[arg(long)]
        inventory: Option<String>,

        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },

    /// Remove a profile
    #[command(visible_alias = "rm", visible_alias = "delete")]
    Remove {
        /// Profile name to remove
        name: String,

        /// Do not ask for confirmation
        #[arg(long, short)]
        force: bool,
    },
}
