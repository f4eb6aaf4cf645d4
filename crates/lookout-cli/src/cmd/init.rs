use anyhow::Context;
use lookout_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing lookout in: {}", root.display());

    // 1. Directory tree
    let dirs = [
        paths::LOOKOUT_DIR,
        paths::ITEMS_DIR,
        paths::QUARANTINE_DIR,
        paths::DEDUP_DIR,
        paths::HEARTBEAT_DIR,
        paths::SUPERVISOR_DIR,
        paths::CONTROL_DIR,
        paths::UNIT_LOGS_DIR,
    ];
    for dir in dirs {
        let path = root.join(dir);
        io::ensure_dir(&path).with_context(|| format!("failed to create {}", path.display()))?;
    }

    // 2. Starter config, left alone if one already exists
    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write starter config")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    println!("\nLookout initialized.");
    println!("Next: declare units in {} and start `lookout run`.", paths::CONFIG_FILE);
    Ok(())
}
