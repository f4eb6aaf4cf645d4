mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lookout",
    about = "Supervised watcher units feeding a durable action-item queue",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (default: auto-detect from .lookout/ or .git/)
    #[arg(long, global = true, env = "LOOKOUT_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the .lookout/ tree and a starter config
    Init,
    /// Show orchestrator, unit, and queue health
    Status,
    /// Run the orchestrator in the foreground
    Run,
    /// Run the watchdog that keeps the orchestrator alive
    Watchdog,
    /// Start, stop, or restart supervised units
    Unit {
        #[command(subcommand)]
        subcommand: cmd::unit::UnitSubcommand,
    },
    /// Work with queued action items
    Item {
        #[command(subcommand)]
        subcommand: cmd::item::ItemSubcommand,
    },
    /// Decide on items held at the approval gate
    Approve {
        #[command(subcommand)]
        subcommand: cmd::approve::ApproveSubcommand,
    },
    /// Inspect the approval audit trail
    Audit {
        #[command(subcommand)]
        subcommand: cmd::audit::AuditSubcommand,
    },
    /// Record a liveness beat for a unit (called from watcher loops)
    Heartbeat {
        /// Unit name as declared in config
        #[arg(long)]
        unit: String,
    },
    /// Validate configuration
    Config {
        #[command(subcommand)]
        subcommand: cmd::config::ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run | Commands::Watchdog => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Status => cmd::status::run(&root, cli.json),
        Commands::Run => cmd::run::run(&root),
        Commands::Watchdog => cmd::watchdog::run(&root),
        Commands::Unit { subcommand } => cmd::unit::run(&root, subcommand, cli.json),
        Commands::Item { subcommand } => cmd::item::run(&root, subcommand, cli.json),
        Commands::Approve { subcommand } => cmd::approve::run(&root, subcommand, cli.json),
        Commands::Audit { subcommand } => cmd::audit::run(&root, subcommand, cli.json),
        Commands::Heartbeat { unit } => cmd::heartbeat::run(&root, &unit),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        let code = e
            .downcast_ref::<cmd::CliExit>()
            .map_or(1, cmd::CliExit::exit_code);
        std::process::exit(code);
    }
}
