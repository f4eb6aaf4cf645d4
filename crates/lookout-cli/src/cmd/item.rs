use crate::output::{humanize_secs, print_json, print_table};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Subcommand;
use lookout_core::config::Config;
use lookout_core::item::{ActionItem, ItemId, ItemState};
use lookout_core::store::{self, CandidateEvent, Outcome, Submission};
use std::path::Path;

#[derive(Subcommand)]
pub enum ItemSubcommand {
    /// Submit a candidate event (idempotent per source and key)
    Submit {
        /// Event source, normally the watcher unit name
        #[arg(long)]
        source: String,
        /// Dedup key, unique within the source
        #[arg(long)]
        key: String,
        /// Payload file, or '-' for stdin
        #[arg(long, default_value = "-")]
        payload: String,
        /// Hold the item at the approval gate instead of queueing it
        #[arg(long)]
        sensitive: bool,
    },
    /// List items, oldest first
    List {
        /// Narrow to one lifecycle state
        #[arg(long)]
        state: Option<String>,
    },
    /// Show one item in full, payload included
    Show {
        /// Item id as source:key
        id: String,
    },
    /// Take exclusive ownership of an item for processing
    Claim {
        /// Item id as source:key
        id: String,
    },
    /// Report the outcome of a claimed item
    Report {
        /// Item id as source:key
        id: String,
        /// The item completed successfully
        #[arg(long, conflicts_with = "error")]
        ok: bool,
        /// The item failed with this message
        #[arg(long)]
        error: Option<String>,
    },
    /// Put a finished item back into rotation
    Reopen {
        /// Item id as source:key
        id: String,
    },
    /// List records pulled aside as unreadable
    Quarantined,
}

pub fn run(root: &Path, subcmd: ItemSubcommand, json: bool) -> Result<()> {
    match subcmd {
        ItemSubcommand::Submit {
            source,
            key,
            payload,
            sensitive,
        } => submit(root, &source, &key, &payload, sensitive, json),
        ItemSubcommand::List { state } => list(root, state.as_deref(), json),
        ItemSubcommand::Show { id } => show(root, &id, json),
        ItemSubcommand::Claim { id } => claim(root, &id, json),
        ItemSubcommand::Report { id, ok, error } => report(root, &id, ok, error, json),
        ItemSubcommand::Reopen { id } => reopen(root, &id, json),
        ItemSubcommand::Quarantined => quarantined(root, json),
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

fn submit(
    root: &Path,
    source: &str,
    key: &str,
    payload: &str,
    sensitive: bool,
    json: bool,
) -> Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let id = ItemId::new(source, key)?;
    let body = read_payload(payload)?;

    // A unit marked sensitive in config makes every event from that source
    // sensitive, whatever the submitter passed.
    let sensitive = sensitive || config.unit(source).is_some_and(|u| u.sensitive);

    let event = CandidateEvent {
        id: id.clone(),
        payload: body,
        sensitive,
    };
    match store::submit(root, &config, event)? {
        Submission::Created(item) => {
            if json {
                print_json(&item)?;
            } else {
                println!("Created '{}' ({}).", item.id(), item.state);
            }
        }
        Submission::Duplicate => {
            if json {
                print_json(&serde_json::json!({ "id": id.to_string(), "duplicate": true }))?;
            } else {
                println!("Duplicate of '{id}'; discarded.");
            }
        }
    }
    Ok(())
}

fn read_payload(arg: &str) -> Result<String> {
    if arg == "-" {
        return std::io::read_to_string(std::io::stdin()).context("failed to read stdin");
    }
    std::fs::read_to_string(arg).with_context(|| format!("failed to read {arg}"))
}

// ---------------------------------------------------------------------------
// List / show
// ---------------------------------------------------------------------------

fn list(root: &Path, state: Option<&str>, json: bool) -> Result<()> {
    let filter = state.map(str::parse::<ItemState>).transpose()?;
    let items = store::list(root, filter)?;

    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }
    let now = Utc::now();
    let rows = items
        .iter()
        .map(|item| {
            vec![
                item.id().to_string(),
                item.state.to_string(),
                item.attempt_count.to_string(),
                humanize_secs(now.signed_duration_since(item.updated_at).num_seconds()),
            ]
        })
        .collect();
    print_table(&["ID", "STATE", "ATTEMPTS", "UPDATED"], rows);
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> Result<()> {
    let id: ItemId = id.parse()?;
    let item = store::get(root, &id)?;

    if json {
        return print_json(&item);
    }
    println!("Item:     {}", item.id());
    println!("State:    {}", item.state);
    println!("Created:  {}", item.created_at.to_rfc3339());
    println!("Updated:  {}", item.updated_at.to_rfc3339());
    println!("Attempts: {}", item.attempt_count);
    if let Some(err) = &item.last_error {
        println!("Error:    {err}");
    }
    if let Some(deadline) = item.approval_deadline {
        println!("Deadline: {}", deadline.to_rfc3339());
    }
    if let Some(at) = item.escalated_at {
        println!("Escalated: {}", at.to_rfc3339());
    }
    println!("\n{}", item.payload);
    Ok(())
}

// ---------------------------------------------------------------------------
// Claim / report / reopen
// ---------------------------------------------------------------------------

fn claim(root: &Path, id: &str, json: bool) -> Result<()> {
    let id: ItemId = id.parse()?;
    let item = store::claim(root, &id)?;
    if json {
        print_json(&item)?;
    } else {
        println!("Claimed '{}'.", item.id());
    }
    Ok(())
}

fn report(root: &Path, id: &str, ok: bool, error: Option<String>, json: bool) -> Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let id: ItemId = id.parse()?;
    let outcome = match (ok, error) {
        (true, None) => Outcome::Success,
        (false, Some(msg)) => Outcome::Failure(msg),
        _ => bail!("pass exactly one of --ok or --error <message>"),
    };

    let item = store::report(root, &config, &id, outcome)?;
    if json {
        print_json(&item)?;
    } else {
        describe_verdict(&item, config.queue.max_attempts);
    }
    Ok(())
}

fn describe_verdict(item: &ActionItem, max_attempts: u32) {
    match item.state {
        ItemState::Done => println!("Item '{}' done.", item.id()),
        ItemState::Pending => println!(
            "Attempt {} of {} failed; requeued.",
            item.attempt_count, max_attempts
        ),
        _ => println!(
            "Item '{}' failed permanently after {} attempts.",
            item.id(),
            item.attempt_count
        ),
    }
}

fn reopen(root: &Path, id: &str, json: bool) -> Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let id: ItemId = id.parse()?;
    let item = store::reopen(root, &config, &id)?;
    if json {
        print_json(&item)?;
    } else {
        println!("Reopened '{}'.", item.id());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Quarantine
// ---------------------------------------------------------------------------

fn quarantined(root: &Path, json: bool) -> Result<()> {
    let entries = store::quarantined(root)?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No quarantined records.");
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|q| vec![q.source.clone(), q.file.clone()])
        .collect();
    print_table(&["SOURCE", "FILE"], rows);
    Ok(())
}
