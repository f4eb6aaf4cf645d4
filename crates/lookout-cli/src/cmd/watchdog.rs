use anyhow::Result;
use lookout_supervisor::watchdog;
use std::path::Path;

/// Keep an orchestrator alive, respawning it with backoff when it dies.
pub fn run(root: &Path) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(watchdog::run(root)).map_err(super::startup_error)
}
