//! Profile management command implementations

use crate::cli::{OutputFormat, ProfileCommands};
use crate::connection::ConnectionManager;
use crate::error::VmCtlError;
use crate::output;
use colored::Colorize;
use std::io::{self, Write};
use tracing::{debug, info, trace};
use vmctl_core::config::{Config, Profile};

/// Handle profile management commands
pub async fn handle_profile_command(
    profile_cmd: &ProfileCommands,
    conn_mgr: &ConnectionManager,
    output_format: OutputFormat,
) -> Result<(), VmCtlError> {
    use ProfileCommands::*;

    match profile_cmd {
        List => handle_list(conn_mgr, output_format).await,
        Path => handle_path(conn_mgr, output_format).await,
        Show { name } => handle_show(conn_mgr, name, output_format).await,
        Set {
            name,
            endpoint,
            username,
            password,
            insecure,
            inventory,
            default,
        } => {
            let profile = Profile {
                password: password.clone(),
                insecure: *insecure,
                inventory: inventory.clone(),
                ..Profile::new(endpoint.as_str(), username.as_str())
            };
            handle_set(conn_mgr, name, profile, *default).await
        }
        Remove { name, force } => handle_remove(conn_mgr, name, *force).await,
    }
}

fn structured(output_format: OutputFormat) -> Option<output::OutputFormat> {
    match output_format {
        OutputFormat::Json => Some(output::OutputFormat::Json),
        OutputFormat::Yaml => Some(output::OutputFormat::Yaml),
        OutputFormat::Table => Some(output::OutputFormat::Table),
        OutputFormat::Auto => None,
    }
}

fn profile_json(name: &str, profile: &Profile, is_default: bool) -> serde_json::Value {
    let mut obj = serde_json::json!({
        "name": name,
        "endpoint": profile.endpoint,
        "username": profile.username,
        "password_configured": profile.has_password(),
        "insecure": profile.insecure,
        "is_default": is_default,
    });
    if let Some(inventory) = &profile.inventory {
        obj["inventory"] = serde_json::json!(inventory);
    }
    if !profile.tracking.is_default() {
        obj["tracking"] = serde_json::json!(&profile.tracking);
    }
    obj
}

async fn handle_list(
    conn_mgr: &ConnectionManager,
    output_format: OutputFormat,
) -> Result<(), VmCtlError> {
    debug!("Listing all configured profiles");
    let profiles = conn_mgr.config.list_profiles();
    trace!("Found {} profiles", profiles.len());
    let default_name = conn_mgr.config.default_profile.as_deref();

    if let Some(fmt) = structured(output_format) {
        let profile_list: Vec<serde_json::Value> = profiles
            .iter()
            .map(|(name, profile)| profile_json(name, profile, default_name == Some(name.as_str())))
            .collect();

        if let output::OutputFormat::Table = fmt {
            output::print_output(&profile_list, fmt)?;
            return Ok(());
        }

        let output_data = serde_json::json!({
            "config_path": conn_mgr.display_config_path(),
            "profiles": profile_list,
            "count": profiles.len()
        });
        output::print_output(&output_data, fmt)?;
        return Ok(());
    }

    if let Some(path) = conn_mgr.display_config_path() {
        println!("Configuration file: {}", path);
        println!();
    }

    if profiles.is_empty() {
        info!("No profiles configured");
        println!("No profiles configured.");
        println!("Use 'vmctl profile set' to create a profile.");
        return Ok(());
    }

    for (name, profile) in &profiles {
        if default_name == Some(name.as_str()) {
            println!("{} {}", name.bold().cyan(), "(default)".green());
        } else {
            println!("{}", name.bold().cyan());
        }
        println!(
            "    {} {}@{}{}",
            "Server:".dimmed(),
            profile.username,
            profile.endpoint,
            if profile.insecure { " (insecure)" } else { "" }
        );
        if let Some(inventory) = &profile.inventory {
            println!("    {} {}", "Inventory:".dimmed(), inventory);
        }
    }

    Ok(())
}

async fn handle_path(
    conn_mgr: &ConnectionManager,
    output_format: OutputFormat,
) -> Result<(), VmCtlError> {
    let config_path = match &conn_mgr.config_path {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    match structured(output_format) {
        Some(fmt) => {
            let output_data = serde_json::json!({
                "config_path": config_path.display().to_string()
            });
            output::print_output(&output_data, fmt)?;
        }
        None => println!("{}", config_path.display()),
    }
    Ok(())
}

async fn handle_show(
    conn_mgr: &ConnectionManager,
    name: &str,
    output_format: OutputFormat,
) -> Result<(), VmCtlError> {
    let profile = conn_mgr.config.profile(name)?;
    let is_default = conn_mgr.config.default_profile.as_deref() == Some(name);

    if let Some(fmt) = structured(output_format) {
        output::print_output(&profile_json(name, profile, is_default), fmt)?;
        return Ok(());
    }

    println!("Profile: {}", name);
    println!("Endpoint: {}", profile.endpoint);
    println!("Username: {}", profile.username);
    println!(
        "Password: {}",
        if profile.has_password() {
            "configured"
        } else if profile.resolve_password().is_some() {
            "from environment"
        } else {
            "not set"
        }
    );
    println!("Insecure: {}", profile.insecure);
    println!(
        "Inventory: {}",
        profile.inventory.as_deref().unwrap_or("not configured")
    );

    let tracking = &profile.tracking;
    println!("Tracking:");
    println!("  Timeout: {}s", tracking.timeout_secs);
    println!(
        "  Polling: {}ms -> {}ms (x{})",
        tracking.poll_initial_ms, tracking.poll_max_ms, tracking.poll_multiplier
    );
    println!("  Concurrency: {}", tracking.max_concurrency);
    println!("  Poll retries: {}", tracking.retry.max_attempts);
    if tracking.rate_limit.enabled {
        println!(
            "  Rate limit: {}/min (burst {})",
            tracking.rate_limit.requests_per_minute, tracking.rate_limit.burst
        );
    }
    if let Some(audit) = &tracking.audit_log {
        println!("  Audit log: {}", audit);
    }

    if is_default {
        println!("Default: yes");
    }

    Ok(())
}

async fn handle_set(
    conn_mgr: &ConnectionManager,
    name: &str,
    profile: Profile,
    make_default: bool,
) -> Result<(), VmCtlError> {
    debug!("Setting profile: {}", name);

    let mut config = conn_mgr.config.clone();

    // Preserve tracking settings from an existing profile when updating
    let existing = config.profiles.get(name).cloned();
    let profile = match &existing {
        Some(existing) => Profile {
            tracking: existing.tracking.clone(),
            ..profile
        },
        None => profile,
    };

    config.set_profile(name.to_string(), profile);
    if make_default || config.profiles.len() == 1 {
        config.default_profile = Some(name.to_string());
    }

    let path = conn_mgr.save_config(&config)?;
    let verb = if existing.is_some() { "updated" } else { "saved" };
    println!("Profile '{}' {} successfully to:", name, verb);
    println!("  {}", path.display());

    if config.default_profile.as_deref() != Some(name) {
        println!();
        println!("Tip: run with --profile {} or make it the default:", name);
        println!(
            "  vmctl profile set {} --endpoint <host> --username <user> --default",
            name
        );
    }

    Ok(())
}

async fn handle_remove(
    conn_mgr: &ConnectionManager,
    name: &str,
    force: bool,
) -> Result<(), VmCtlError> {
    debug!("Removing profile: {}", name);

    if !conn_mgr.config.profiles.contains_key(name) {
        return Err(VmCtlError::ProfileNotFound { name: name.into() });
    }

    let is_default = conn_mgr.config.default_profile.as_deref() == Some(name);
    if is_default {
        println!("Warning: '{}' is the default profile.", name);
    }

    if !force {
        print!(
            "Are you sure you want to remove profile '{}'? (y/N): ",
            name
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input != "y" && input != "yes" {
            println!("Profile removal cancelled.");
            return Ok(());
        }
    }

    let mut config = conn_mgr.config.clone();
    config.remove_profile(name);
    if is_default {
        println!("Default profile cleared.");
    }

    conn_mgr.save_config(&config)?;
    println!("Profile '{}' removed successfully.", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_json_hides_password() {
        let profile = Profile {
            password: Some("hunter2".to_string()),
            inventory: Some("~/fleet.toml".to_string()),
            ..Profile::new("vc01", "ops")
        };
        let value = profile_json("lab", &profile, true);
        assert_eq!(value["password_configured"], true);
        assert_eq!(value["inventory"], "~/fleet.toml");
        assert!(value.get("password").is_none());
        assert!(value.get("tracking").is_none());
        assert!(!value.to_string().contains("hunter2"));
    }
}
