use anyhow::{anyhow, Result};
use lookout_supervisor::Orchestrator;
use std::path::Path;

/// Run the orchestrator in the foreground until Ctrl-C.
pub fn run(root: &Path) -> Result<()> {
    let orchestrator = Orchestrator::start(root).map_err(super::startup_error)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(orchestrator.run()).map_err(|e| anyhow!("{e}"))
}
