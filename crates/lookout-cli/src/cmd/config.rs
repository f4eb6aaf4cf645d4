use crate::cmd::CliExit;
use crate::output::print_json;
use anyhow::Result;
use clap::Subcommand;
use lookout_core::config::{Config, WarnLevel};
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config and list findings
    Check,
}

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> Result<()> {
    match subcmd {
        ConfigSubcommand::Check => check(root, json),
    }
}

fn check(root: &Path, json: bool) -> Result<()> {
    let config = Config::load(root).map_err(super::config_error)?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let errors = warnings
        .iter()
        .filter(|w| w.level == WarnLevel::Error)
        .count();
    if errors > 0 {
        return Err(CliExit::ConfigInvalid(format!("{errors} error(s) found")).into());
    }
    Ok(())
}
