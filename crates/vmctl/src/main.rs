use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells};
use tracing::{debug, error, info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vmctl_core::config::Config;

mod cli;
mod commands;
mod connection;
mod error;
mod output;

use cli::{Cli, Commands};
use connection::{ConnectionManager, TrackingOverrides};
use error::VmCtlError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level
    init_tracing(cli.verbose);

    // Load configuration from specified path or default location
    let loaded = if let Some(config_file) = &cli.config_file {
        let path = std::path::PathBuf::from(config_file);
        debug!("Loading config from explicit path: {:?}", path);
        Config::load_from_path(&path).map(|config| (config, Some(path)))
    } else {
        debug!("Loading config from default location");
        Config::load().map(|config| (config, None))
    };
    let (config, config_path) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            VmCtlError::from(e).diagnostic().print();
            std::process::exit(1);
        }
    };
    let conn_mgr = ConnectionManager::with_config_path(config, config_path);

    if let Err(e) = execute_command(&cli, &conn_mgr).await {
        e.diagnostic().print();
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    // Check for RUST_LOG env var first, then fall back to verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "vmctl=warn,vmctl_core=warn",
            1 => "vmctl=info,vmctl_core=info",
            2 => "vmctl=debug,vmctl_core=debug",
            _ => "vmctl=trace,vmctl_core=trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    debug!("Tracing initialized with verbosity level: {}", verbose);
}

async fn execute_command(cli: &Cli, conn_mgr: &ConnectionManager) -> Result<(), VmCtlError> {
    // Log command execution with sanitized parameters
    trace!("Executing command: {}", format_command(&cli.command));
    info!("Command: {}", format_command(&cli.command));

    let start = std::time::Instant::now();
    let result = match &cli.command {
        Commands::Version => {
            debug!("Showing version information");
            match cli.output {
                cli::OutputFormat::Json | cli::OutputFormat::Yaml => {
                    let output_data = serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "name": env!("CARGO_PKG_NAME"),
                    });

                    let fmt = match cli.output {
                        cli::OutputFormat::Yaml => output::OutputFormat::Yaml,
                        _ => output::OutputFormat::Json,
                    };

                    output::print_output(&output_data, fmt)?;
                }
                _ => {
                    println!("vmctl {}", env!("CARGO_PKG_VERSION"));
                }
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            debug!("Generating completions for {:?}", shell);
            generate_completions(*shell);
            Ok(())
        }

        Commands::Session => {
            commands::session::handle_session_command(conn_mgr, cli.profile.as_deref(), cli.output)
                .await
        }

        Commands::Vm(vm_cmd) => {
            let overrides = TrackingOverrides {
                timeout_secs: cli.tracking.timeout,
                max_concurrency: cli.tracking.concurrency,
                rate_limit: cli.tracking.rate_limit,
                retry_attempts: cli.tracking.retry_attempts,
                audit_log: cli.tracking.audit_log.clone(),
            };
            commands::vm::handle_vm_command(
                vm_cmd,
                conn_mgr,
                cli.profile.as_deref(),
                &overrides,
                cli.output,
            )
            .await
        }

        Commands::Profile(profile_cmd) => {
            debug!("Executing profile command");
            commands::profile::handle_profile_command(profile_cmd, conn_mgr, cli.output).await
        }
    };

    let duration = start.elapsed();
    match &result {
        Ok(_) => info!("Command completed successfully in {:?}", duration),
        Err(e) => error!("Command failed after {:?}: {}", duration, e),
    }

    result
}

/// Generate shell completions
fn generate_completions(shell: cli::Shell) {
    let mut cmd = cli::Cli::command();
    let name = cmd.get_name().to_string();

    match shell {
        cli::Shell::Bash => generate(shells::Bash, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Zsh => generate(shells::Zsh, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Fish => generate(shells::Fish, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, name, &mut std::io::stdout())
        }
        cli::Shell::Elvish => generate(shells::Elvish, &mut cmd, name, &mut std::io::stdout()),
    }
}

/// Format command for human-readable logging (without sensitive data)
fn format_command(command: &Commands) -> String {
    match command {
        Commands::Version => "version".to_string(),
        Commands::Completions { shell } => format!("completions {:?}", shell),
        Commands::Session => "session".to_string(),
        Commands::Vm(cmd) => {
            use cli::VmCommands::*;
            match cmd {
                List { filter, .. } => format!("vm list {}", filter.as_deref().unwrap_or("")),
                PowerOn { filter } => format!("vm power-on {}", filter),
                PowerOff { filter } => format!("vm power-off {}", filter),
                Snapshot { filter, name, .. } => format!("vm snapshot {} --name {}", filter, name),
                Revert { filter, snapshot } => {
                    format!("vm revert {} --snapshot {}", filter, snapshot)
                }
                Reconfigure { filter, .. } => format!("vm reconfigure {}", filter),
                Network { filter, network } => format!("vm network {} --network {}", filter, network),
                Delete { filter } => format!("vm delete {}", filter),
            }
        }
        Commands::Profile(cmd) => {
            use cli::ProfileCommands::*;
            match cmd {
                List => "profile list".to_string(),
                Path => "profile path".to_string(),
                Show { name } => format!("profile show {}", name),
                Set { name, .. } => format!("profile set {} [credentials redacted]", name),
                Remove { name, .. } => format!("profile remove {}", name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_format_command_redacts_password() {
        let cli = Cli::parse_from([
            "vmctl",
            "profile",
            "set",
            "lab",
            "--endpoint",
            "vc01",
            "--username",
            "ops",
            "--password",
            "hunter2",
        ]);
        let formatted = format_command(&cli.command);
        assert_eq!(formatted, "profile set lab [credentials redacted]");
    }

    #[test]
    fn test_global_tracking_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "vmctl",
            "vm",
            "power-on",
            "^web-",
            "--timeout",
            "30",
            "--rate-limit",
            "60",
        ]);
        assert_eq!(cli.tracking.timeout, Some(30));
        assert_eq!(cli.tracking.rate_limit, Some(60));
        assert!(matches!(
            cli.command,
            Commands::Vm(cli::VmCommands::PowerOn { ref filter }) if filter == "^web-"
        ));
    }
}
