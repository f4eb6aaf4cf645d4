use crate::cmd::CliExit;
use crate::output::print_json;
use anyhow::{bail, Result};
use clap::Subcommand;
use lookout_core::config::Config;
use lookout_supervisor::control::{self, ControlAction, ControlRequest};
use lookout_supervisor::orchestrator;
use std::path::Path;

#[derive(Subcommand)]
pub enum UnitSubcommand {
    /// Start a unit (also lifts a crash hold)
    Start {
        /// Unit name
        name: Option<String>,
        /// Target every enabled unit
        #[arg(long)]
        all: bool,
    },
    /// Stop a unit; it stays down until started again
    Stop {
        /// Unit name
        name: Option<String>,
        /// Target every enabled unit
        #[arg(long)]
        all: bool,
    },
    /// Stop a unit and spawn it fresh
    Restart {
        /// Unit name
        name: Option<String>,
        /// Target every enabled unit
        #[arg(long)]
        all: bool,
    },
}

pub fn run(root: &Path, subcmd: UnitSubcommand, json: bool) -> Result<()> {
    let (action, name, all) = match subcmd {
        UnitSubcommand::Start { name, all } => (ControlAction::Start, name, all),
        UnitSubcommand::Stop { name, all } => (ControlAction::Stop, name, all),
        UnitSubcommand::Restart { name, all } => (ControlAction::Restart, name, all),
    };
    request(root, action, name, all, json)
}

/// Queue control requests for the orchestrator to pick up on its next tick.
/// Requests without a live orchestrator would sit unread, so that case is
/// refused up front.
fn request(
    root: &Path,
    action: ControlAction,
    name: Option<String>,
    all: bool,
    json: bool,
) -> Result<()> {
    let config = Config::load(root).map_err(super::config_error)?;

    let targets: Vec<String> = if all {
        config.enabled_units().map(|u| u.name.clone()).collect()
    } else {
        match name {
            Some(name) => vec![name],
            None => bail!("unit name required (or pass --all)"),
        }
    };
    if targets.is_empty() {
        bail!("no enabled units in config");
    }

    if orchestrator::live_pid(root).is_none() {
        bail!("no orchestrator is running; start one with 'lookout run'");
    }

    let mut submitted = Vec::new();
    let mut failed = Vec::new();
    for unit in &targets {
        if config.unit(unit).is_none() {
            eprintln!("unit '{unit}' is not in the config");
            failed.push(unit.clone());
            continue;
        }
        match control::submit(root, &ControlRequest::new(action, unit.as_str())) {
            Ok(_) => submitted.push(unit.clone()),
            Err(e) => {
                eprintln!("unit '{unit}': {e}");
                failed.push(unit.clone());
            }
        }
    }

    if json {
        print_json(&serde_json::json!({
            "action": action.as_str(),
            "submitted": submitted,
            "failed": failed,
        }))?;
    } else {
        for unit in &submitted {
            println!("Requested {action} for '{unit}'.");
        }
    }

    if !failed.is_empty() {
        return Err(CliExit::Partial {
            failed: failed.len(),
            total: targets.len(),
        }
        .into());
    }
    Ok(())
}
