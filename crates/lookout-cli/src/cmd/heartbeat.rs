use anyhow::{anyhow, bail, Result};
use lookout_core::config::Config;
use lookout_supervisor::heartbeat;
use std::path::Path;

/// Touch the unit's heartbeat file. Watcher loops shell out to this between
/// polls; output stays empty so it is silent in their logs.
pub fn run(root: &Path, unit: &str) -> Result<()> {
    let config = Config::load(root).map_err(|e| anyhow!("{e}"))?;
    if config.unit(unit).is_none() {
        bail!("unknown unit '{unit}'");
    }
    heartbeat::beat(root, unit).map_err(|e| anyhow!("{e}"))?;
    Ok(())
}
