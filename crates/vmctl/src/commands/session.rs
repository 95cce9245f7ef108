//! Session information

use crate::cli::OutputFormat;
use crate::connection::ConnectionManager;
use crate::error::Result as CliResult;
use crate::output;
use colored::Colorize;
use tracing::debug;
use vmctl_core::sim::SimulatedFleet;

pub async fn handle_session_command(
    conn_mgr: &ConnectionManager,
    profile_name: Option<&str>,
    output_format: OutputFormat,
) -> CliResult<()> {
    let (name, profile, session) = conn_mgr.establish_session(profile_name)?;

    // The inventory is optional here; the session itself does not need it
    let inventory = profile.inventory_path();
    let vm_count = match &inventory {
        Some(path) => match SimulatedFleet::load(path) {
            Ok(fleet) => Some(fleet.len()),
            Err(e) => {
                debug!("Inventory not loadable: {}", e);
                None
            }
        },
        None => None,
    };

    match output_format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let mut data = serde_json::json!({
                "profile": name,
                "session": session,
                "password_configured": profile.resolve_password().is_some(),
            });
            if let Some(path) = &inventory {
                data["inventory"] = serde_json::json!(path.display().to_string());
            }
            if let Some(count) = vm_count {
                data["vm_count"] = serde_json::json!(count);
            }

            let fmt = match output_format {
                OutputFormat::Yaml => output::OutputFormat::Yaml,
                _ => output::OutputFormat::Json,
            };
            output::print_output(&data, fmt)?;
        }
        _ => {
            println!("{} {}", "Profile:".bold(), name);
            println!("  Server:       {}", session.server);
            println!("  User:         {}", session.username);
            println!("  Source IP:    {}", session.source_ip);
            println!("  Session key:  {}", session.session_key);
            println!(
                "  Established:  {}",
                session.established_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            if session.insecure {
                println!("  TLS:          {}", "verification disabled".yellow());
            }
            match (&inventory, vm_count) {
                (Some(path), Some(count)) => {
                    println!("  Inventory:    {} ({} VMs)", path.display(), count)
                }
                (Some(path), None) => {
                    println!("  Inventory:    {} {}", path.display(), "(unreadable)".red())
                }
                (None, _) => println!("  Inventory:    {}", "not configured".dimmed()),
            }
        }
    }
    Ok(())
}
