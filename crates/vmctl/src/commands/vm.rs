//! Virtual machine listing and batch lifecycle actions

use crate::cli::{OutputFormat, VmCommands};
use crate::connection::{ConnectionManager, TrackingOverrides};
use crate::error::{Result as CliResult, VmCtlError};
use crate::output;
use colored::Colorize;
use comfy_table::{Cell, Color, Table};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vmctl_core::{
    ActionParams, BatchResult, LifecycleRules, OperationKind, OperationState, PowerState,
    ProgressCallback, ProgressEvent, RemoteOperation, ResourceDirectory, TargetFilter,
    VmSummary,
};

/// Handle `vmctl vm ...`
pub async fn handle_vm_command(
    vm_cmd: &VmCommands,
    conn_mgr: &ConnectionManager,
    profile_name: Option<&str>,
    overrides: &TrackingOverrides,
    output_format: OutputFormat,
) -> CliResult<()> {
    match vm_cmd {
        VmCommands::List {
            filter,
            power_state,
        } => {
            handle_list(
                conn_mgr,
                profile_name,
                filter.as_deref(),
                *power_state,
                output_format,
            )
            .await
        }
        action => {
            let (filter, kind, params) = action_request(action)?;
            run_batch(
                conn_mgr,
                profile_name,
                overrides,
                filter,
                kind,
                params,
                output_format,
            )
            .await
        }
    }
}

/// Filter, kind and parameters of an action subcommand
fn action_request(cmd: &VmCommands) -> CliResult<(&str, OperationKind, ActionParams)> {
    let request = match cmd {
        VmCommands::PowerOn { filter } => (filter, OperationKind::PowerOn, ActionParams::None),
        VmCommands::PowerOff { filter } => (filter, OperationKind::PowerOff, ActionParams::None),
        VmCommands::Delete { filter } => (filter, OperationKind::Delete, ActionParams::None),
        VmCommands::Snapshot {
            filter,
            name,
            description,
        } => (
            filter,
            OperationKind::Snapshot,
            ActionParams::Snapshot {
                name: name.clone(),
                description: description.clone(),
            },
        ),
        VmCommands::Revert { filter, snapshot } => (
            filter,
            OperationKind::Revert,
            ActionParams::Revert {
                snapshot: snapshot.clone(),
            },
        ),
        VmCommands::Reconfigure {
            filter,
            cpus,
            memory_mb,
        } => {
            if cpus.is_none() && memory_mb.is_none() {
                return Err(VmCtlError::InvalidInput {
                    message: "reconfigure needs --cpus and/or --memory-mb".to_string(),
                });
            }
            if *cpus == Some(0) || *memory_mb == Some(0) {
                return Err(VmCtlError::InvalidInput {
                    message: "--cpus and --memory-mb must be greater than zero".to_string(),
                });
            }
            (
                filter,
                OperationKind::Reconfigure,
                ActionParams::Reconfigure {
                    cpus: *cpus,
                    memory_mb: *memory_mb,
                },
            )
        }
        VmCommands::Network { filter, network } => (
            filter,
            OperationKind::ChangeNetwork,
            ActionParams::ChangeNetwork {
                network: network.clone(),
            },
        ),
        VmCommands::List { .. } => {
            return Err(VmCtlError::InvalidInput {
                message: "list is not an action".to_string(),
            });
        }
    };
    Ok((request.0.as_str(), request.1, request.2))
}

async fn handle_list(
    conn_mgr: &ConnectionManager,
    profile_name: Option<&str>,
    filter: Option<&str>,
    power_state: Option<PowerState>,
    output_format: OutputFormat,
) -> CliResult<()> {
    let conn = conn_mgr.connect(profile_name, &TrackingOverrides::default())?;
    let target_filter = TargetFilter::parse(filter)?;

    let vms: Vec<VmSummary> = conn
        .fleet
        .describe(&target_filter)
        .await?
        .into_iter()
        .filter(|vm| power_state.is_none_or(|state| vm.power_state == state))
        .collect();
    debug!("{} VMs matched", vms.len());

    match output_format {
        OutputFormat::Json => output::print_output(&vms, output::OutputFormat::Json)?,
        OutputFormat::Yaml => output::print_output(&vms, output::OutputFormat::Yaml)?,
        OutputFormat::Auto | OutputFormat::Table => {
            if vms.is_empty() {
                println!("No VMs found.");
                return Ok(());
            }
            println!("{}", vm_table(&vms));
            println!("{} VMs", vms.len());
        }
    }
    Ok(())
}

fn vm_table(vms: &[VmSummary]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Name", "Power", "CPUs", "Memory (GB)", "IP Address"]);
    for vm in vms {
        let power = Cell::new(vm.power_state.to_string()).fg(match vm.power_state {
            PowerState::PoweredOn => Color::Green,
            PowerState::PoweredOff => Color::Red,
            PowerState::Suspended => Color::Yellow,
        });
        table.add_row(vec![
            Cell::new(&vm.name),
            power,
            Cell::new(vm.cpus),
            Cell::new(format!("{:.1}", vm.memory_gb())),
            Cell::new(vm.display_ip()),
        ]);
    }
    table
}

async fn run_batch(
    conn_mgr: &ConnectionManager,
    profile_name: Option<&str>,
    overrides: &TrackingOverrides,
    filter: &str,
    kind: OperationKind,
    params: ActionParams,
    output_format: OutputFormat,
) -> CliResult<()> {
    let conn = conn_mgr.connect(profile_name, overrides)?;
    let targets = conn.fleet.find(&TargetFilter::parse(Some(filter))?).await?;
    if targets.is_empty() {
        return Err(VmCtlError::NoMatchingTargets {
            filter: filter.to_string(),
        });
    }
    info!(
        "Starting {} on {} VMs as {}",
        kind.verb(),
        targets.len(),
        conn.session.principal()
    );

    let interactive = matches!(output_format, OutputFormat::Auto | OutputFormat::Table);
    let pb = Arc::new(progress_bar(targets.len() as u64, kind, interactive));

    let pb_clone = Arc::clone(&pb);
    let progress: ProgressCallback = Arc::new(move |event: ProgressEvent| match &event {
        ProgressEvent::Started { target, .. } => {
            pb_clone.set_message(format!("{} started", target));
        }
        ProgressEvent::Polling { target, status, .. } => {
            pb_clone.set_message(format!("{}: {}", target, status));
        }
        ProgressEvent::Retrying {
            target, attempt, ..
        } => {
            pb_clone.set_message(format!("{}: retrying poll ({})", target, attempt));
        }
        ProgressEvent::Finished(op) => {
            pb_clone.inc(1);
            pb_clone.set_message(format!("{}: {}", op.target, op.state));
        }
    });

    let executor = conn.executor(Some(progress))?;
    let rules = LifecycleRules::new(conn.fleet.clone(), kind, params.clone());
    let invoker = conn.fleet.action(kind);
    let batch = executor.execute(&targets, kind, &params, &rules, &invoker);
    tokio::pin!(batch);
    let result = tokio::select! {
        result = &mut batch => result?,
        _ = tokio::signal::ctrl_c() => {
            pb.set_message("interrupted, cancelling");
            warn!("Interrupted; cancelling {} in flight", kind.verb());
            executor.stop().await;
            batch.await?
        }
    };
    pb.finish_and_clear();

    conn.save_inventory()?;

    match output_format {
        OutputFormat::Json => output::print_output(&result, output::OutputFormat::Json)?,
        OutputFormat::Yaml => output::print_output(&result, output::OutputFormat::Yaml)?,
        OutputFormat::Table => println!("{}", outcome_table(&result)),
        OutputFormat::Auto => print_report(&result),
    }

    let summary = result.summary();
    if result.is_complete_success() {
        Ok(())
    } else {
        let failed = summary.total - summary.succeeded;
        warn!("{} of {} targets failed", failed, summary.total);
        Err(VmCtlError::BatchIncomplete {
            action: kind.to_string(),
            failed,
            total: summary.total,
        })
    }
}

fn progress_bar(len: u64, kind: OperationKind, visible: bool) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if !visible {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{bar:30}] {pos}/{len} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_prefix(kind.verb());
    pb
}

/// Per-target lines followed by a one-line summary
fn print_report(result: &BatchResult) {
    for op in &result.outcomes {
        println!("{}", outcome_line(op));
    }

    let summary = result.summary();
    let mut parts = vec![format!("{} succeeded", summary.succeeded)];
    if summary.skipped > 0 {
        parts.push(format!("{} unchanged", summary.skipped));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.timed_out > 0 {
        parts.push(format!("{} timed out", summary.timed_out));
    }
    if summary.cancelled > 0 {
        parts.push(format!("{} cancelled", summary.cancelled));
    }
    println!();
    println!(
        "{}: {} ({} total)",
        result.kind.verb().bold(),
        parts.join(", "),
        summary.total
    );
}

/// One row per target for `-o table`
fn outcome_table(result: &BatchResult) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["VM", "Action", "State", "Duration", "Detail"]);
    for op in &result.outcomes {
        let state = match op.state {
            OperationState::Succeeded if op.skip_reason.is_some() => {
                Cell::new("unchanged").fg(Color::DarkGrey)
            }
            OperationState::Succeeded => Cell::new(op.state).fg(Color::Green),
            OperationState::TimedOut | OperationState::Cancelled => {
                Cell::new(op.state).fg(Color::Yellow)
            }
            _ => Cell::new(op.state).fg(Color::Red),
        };
        let duration = op
            .elapsed()
            .filter(|_| op.handle.is_some())
            .map(|d| format!("{:.1}s", d.num_milliseconds() as f64 / 1000.0))
            .unwrap_or_else(|| "-".to_string());
        let detail = match (&op.skip_reason, &op.error) {
            (Some(reason), _) => reason.clone(),
            (None, Some(error)) => error.message.clone(),
            (None, None) => String::new(),
        };
        table.add_row(vec![
            Cell::new(&op.target),
            Cell::new(op.kind),
            state,
            Cell::new(duration),
            Cell::new(detail),
        ]);
    }
    table
}

fn outcome_line(op: &RemoteOperation) -> String {
    let marker = match op.state {
        OperationState::Succeeded if op.skip_reason.is_some() => "-".dimmed(),
        OperationState::Succeeded => "✓".green(),
        OperationState::TimedOut => "⏱".yellow(),
        _ => "✗".red(),
    };
    let detail = match (&op.skip_reason, &op.error) {
        (Some(reason), _) => reason.dimmed().to_string(),
        (None, Some(error)) => error.to_string(),
        (None, None) => match op.elapsed() {
            Some(elapsed) => format!(
                "{} ({:.1}s)",
                op.state,
                elapsed.num_milliseconds() as f64 / 1000.0
            ),
            None => op.state.to_string(),
        },
    };
    format!("  {} {:<24} {}", marker, op.target, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconfigure_needs_a_change() {
        let cmd = VmCommands::Reconfigure {
            filter: "app".to_string(),
            cpus: None,
            memory_mb: None,
        };
        assert!(matches!(
            action_request(&cmd),
            Err(VmCtlError::InvalidInput { .. })
        ));

        let cmd = VmCommands::Reconfigure {
            filter: "app".to_string(),
            cpus: Some(4),
            memory_mb: None,
        };
        let (filter, kind, params) = action_request(&cmd).unwrap();
        assert_eq!(filter, "app");
        assert_eq!(kind, OperationKind::Reconfigure);
        assert!(params.fits(kind));
    }

    #[test]
    fn test_every_action_builds_fitting_params() {
        let commands = [
            VmCommands::PowerOn { filter: "a".into() },
            VmCommands::PowerOff { filter: "a".into() },
            VmCommands::Delete { filter: "a".into() },
            VmCommands::Snapshot {
                filter: "a".into(),
                name: "s1".into(),
                description: None,
            },
            VmCommands::Revert {
                filter: "a".into(),
                snapshot: "s1".into(),
            },
            VmCommands::Network {
                filter: "a".into(),
                network: "VM Network".into(),
            },
        ];
        for cmd in &commands {
            let (_, kind, params) = action_request(cmd).unwrap();
            assert!(params.fits(kind), "{:?}", cmd);
        }
    }

    #[test]
    fn test_vm_table_shows_na_for_missing_ip() {
        let vms = vec![VmSummary {
            name: "web-01".to_string(),
            power_state: PowerState::PoweredOff,
            cpus: 2,
            memory_mb: 3072,
            ip_address: None,
            network: None,
            snapshots: vec![],
        }];
        let rendered = vm_table(&vms).to_string();
        assert!(rendered.contains("web-01"));
        assert!(rendered.contains("3.0"));
        assert!(rendered.contains("N/A"));
    }

    #[tokio::test]
    async fn test_outcome_table_marks_unchanged_and_failures() {
        let tracker = vmctl_core::OperationTracker::new();
        let result = BatchResult {
            kind: OperationKind::PowerOn,
            outcomes: vec![
                tracker
                    .skip("web-02", OperationKind::PowerOn, "already powered on")
                    .await,
                tracker
                    .reject("db-01", OperationKind::PowerOn, "VM is suspended")
                    .await,
                tracker.abandon("db-02", OperationKind::PowerOn).await,
            ],
        };

        let rendered = outcome_table(&result).to_string();
        assert!(rendered.contains("unchanged"));
        assert!(rendered.contains("already powered on"));
        assert!(rendered.contains("VM is suspended"));
        assert!(rendered.contains("cancelled"));
        // nothing was submitted, so no duration is shown
        assert!(!rendered.contains("0.0s"));
    }
}
