use crate::output::{humanize_secs, print_json, print_table};
use anyhow::{anyhow, Result};
use lookout_core::store;
use lookout_supervisor::{self as supervisor, UnitView};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> Result<()> {
    let report = supervisor::status(root).map_err(super::startup_error)?;
    let counts = store::counts(root).map_err(|e| anyhow!("{e}"))?;

    if json {
        return print_json(&serde_json::json!({
            "orchestrator": {
                "alive": report.orchestrator_alive,
                "pid": report.orchestrator_pid,
            },
            "units": report.units,
            "items": counts,
        }));
    }

    match report.orchestrator_pid {
        Some(pid) if report.orchestrator_alive => println!("Orchestrator: running (PID {pid})"),
        _ => println!("Orchestrator: not running"),
    }
    println!();

    if report.units.is_empty() {
        println!("No units configured.");
    } else {
        let rows = report
            .units
            .iter()
            .map(|u| {
                vec![
                    u.name.clone(),
                    status_cell(u),
                    u.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                    u.uptime_secs.map(humanize_secs).unwrap_or_else(|| "-".into()),
                    heartbeat_cell(u),
                    u.consecutive_failures.to_string(),
                ]
            })
            .collect();
        print_table(
            &["UNIT", "STATUS", "PID", "UPTIME", "HEARTBEAT", "FAILURES"],
            rows,
        );
    }
    println!();

    let busy: Vec<String> = counts
        .by_state
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(state, n)| format!("{n} {state}"))
        .collect();
    let mut line = if busy.is_empty() {
        "Items: none".to_string()
    } else {
        format!("Items: {}", busy.join(", "))
    };
    if counts.quarantined > 0 {
        line.push_str(&format!(" ({} quarantined)", counts.quarantined));
    }
    println!("{line}");
    Ok(())
}

fn status_cell(unit: &UnitView) -> String {
    if !unit.enabled {
        return "disabled".to_string();
    }
    unit.status.to_string()
}

fn heartbeat_cell(unit: &UnitView) -> String {
    match unit.heartbeat_age_secs {
        Some(age) if unit.heartbeat_stale => format!("{} (stale)", humanize_secs(age)),
        Some(age) => humanize_secs(age),
        None => "-".to_string(),
    }
}
