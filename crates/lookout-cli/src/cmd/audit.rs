use crate::output::{print_json, print_table};
use anyhow::Result;
use clap::Subcommand;
use lookout_core::approval;
use std::path::Path;

#[derive(Subcommand)]
pub enum AuditSubcommand {
    /// Show the approval audit trail, oldest first
    List {
        /// Narrow to one item (source:key)
        #[arg(long)]
        item: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: AuditSubcommand, json: bool) -> Result<()> {
    match subcmd {
        AuditSubcommand::List { item } => list(root, item.as_deref(), json),
    }
}

fn list(root: &Path, item: Option<&str>, json: bool) -> Result<()> {
    let mut entries = approval::audit_entries(root)?;
    if let Some(filter) = item {
        entries.retain(|e| e.item == filter);
    }

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("Audit trail is empty.");
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.at.to_rfc3339(),
                e.item.clone(),
                e.action.to_string(),
                e.actor.clone(),
                e.reason.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["TIME", "ITEM", "ACTION", "ACTOR", "REASON"], rows);
    Ok(())
}
