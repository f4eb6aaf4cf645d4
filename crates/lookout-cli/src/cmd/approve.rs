use crate::output::{humanize_secs, print_json, print_table};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use lookout_core::approval::{self, Decision};
use lookout_core::config::Config;
use lookout_core::item::{ItemId, ItemState};
use lookout_core::store;
use std::path::Path;

#[derive(Subcommand)]
pub enum ApproveSubcommand {
    /// List items waiting for a decision
    List,
    /// Approve a waiting item so it can be claimed
    Grant {
        /// Item id as source:key
        id: String,
        /// Acting operator (defaults to $USER)
        #[arg(long)]
        actor: Option<String>,
        /// Note for the audit trail
        #[arg(long)]
        reason: Option<String>,
    },
    /// Reject a waiting item; rejection is final
    Deny {
        /// Item id as source:key
        id: String,
        /// Acting operator (defaults to $USER)
        #[arg(long)]
        actor: Option<String>,
        /// Note for the audit trail
        #[arg(long)]
        reason: Option<String>,
    },
    /// Send a pending item to the approval gate
    Request {
        /// Item id as source:key
        id: String,
        /// Acting operator (defaults to $USER)
        #[arg(long)]
        actor: Option<String>,
    },
    /// Apply overdue deadline escalations now (the orchestrator also does
    /// this every tick)
    Sweep,
}

pub fn run(root: &Path, subcmd: ApproveSubcommand, json: bool) -> Result<()> {
    match subcmd {
        ApproveSubcommand::List => list(root, json),
        ApproveSubcommand::Grant { id, actor, reason } => {
            decide(root, &id, Decision::Approve, actor, reason, json)
        }
        ApproveSubcommand::Deny { id, actor, reason } => {
            decide(root, &id, Decision::Reject, actor, reason, json)
        }
        ApproveSubcommand::Request { id, actor } => request(root, &id, actor, json),
        ApproveSubcommand::Sweep => sweep(root, json),
    }
}

fn resolve_actor(actor: Option<String>) -> String {
    actor
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "operator".to_string())
}

fn list(root: &Path, json: bool) -> Result<()> {
    let waiting = store::list(root, Some(ItemState::AwaitingApproval))?;
    if json {
        return print_json(&waiting);
    }
    if waiting.is_empty() {
        println!("Nothing waiting for approval.");
        return Ok(());
    }
    let now = Utc::now();
    let rows = waiting
        .iter()
        .map(|item| {
            vec![
                item.id().to_string(),
                item.approval_deadline
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| "-".into()),
                if item.escalated_at.is_some() {
                    "yes".to_string()
                } else {
                    "no".to_string()
                },
                humanize_secs(now.signed_duration_since(item.created_at).num_seconds()),
            ]
        })
        .collect();
    print_table(&["ID", "DEADLINE", "ESCALATED", "AGE"], rows);
    Ok(())
}

fn decide(
    root: &Path,
    id: &str,
    decision: Decision,
    actor: Option<String>,
    reason: Option<String>,
    json: bool,
) -> Result<()> {
    let id: ItemId = id.parse()?;
    let actor = resolve_actor(actor);
    let item = approval::decide(root, &id, decision, &actor, reason)?;
    if json {
        print_json(&item)?;
    } else {
        match decision {
            Decision::Approve => println!("Approved '{}'; it can be claimed now.", item.id()),
            Decision::Reject => println!("Rejected '{}'.", item.id()),
        }
    }
    Ok(())
}

fn request(root: &Path, id: &str, actor: Option<String>, json: bool) -> Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let id: ItemId = id.parse()?;
    let actor = resolve_actor(actor);
    let deadline = Utc::now() + config.approval.soft_deadline();
    let item = approval::submit_for_approval(root, &id, deadline, &actor)?;
    if json {
        print_json(&item)?;
    } else {
        println!(
            "Sent '{}' to the approval gate; deadline {}.",
            item.id(),
            deadline.to_rfc3339()
        );
    }
    Ok(())
}

fn sweep(root: &Path, json: bool) -> Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let report = approval::sweep(root, &config, Utc::now())?;
    if json {
        return print_json(&report);
    }
    if report.escalated.is_empty() && report.expired.is_empty() {
        println!("No deadlines due.");
    } else {
        for id in &report.escalated {
            println!("escalated: {id}");
        }
        for id in &report.expired {
            println!("expired:   {id}");
        }
    }
    Ok(())
}
