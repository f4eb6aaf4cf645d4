//! Keeps an orchestrator running.
//!
//! The watchdog is a tiny outer loop meant to run under an init system or a
//! terminal the operator forgets about. It checks the orchestrator pid file
//! on the supervision interval and respawns `lookout run` when nothing live
//! holds it. Respawns use the same exponential backoff as unit restarts but
//! with no failure ceiling: the watchdog never gives up on the orchestrator.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use lookout_core::config::Config;

use crate::orchestrator;
use crate::process;
use crate::unit::backoff_delay;
use crate::Result;

/// Watch the orchestrator for `root` until Ctrl-C.
pub async fn run(root: &Path) -> Result<()> {
    let config = Config::load(root)?;
    config.validate_strict()?;

    let base = config.supervision.restart_base();
    let max = config.supervision.restart_max();
    let check_interval = config.supervision.health_interval();

    let mut spawned: Option<Child> = None;
    let mut failures: u32 = 0;

    info!(pid = std::process::id(), "watchdog started");

    if orchestrator::live_pid(root).is_none() {
        match spawn_orchestrator(root) {
            Ok(child) => spawned = Some(child),
            Err(e) => error!(error = %e, "failed to spawn orchestrator"),
        }
    }

    loop {
        if !sleep_or_ctrl_c(check_interval).await {
            break;
        }

        // Reap first: an exited child stays a zombie (and `kill -0` keeps
        // succeeding on its pid) until waited on.
        if let Some(child) = spawned.as_mut() {
            if let Ok(Some(_)) = child.try_wait() {
                spawned = None;
            }
        }

        if orchestrator::live_pid(root).is_some() {
            failures = 0;
            continue;
        }

        failures = failures.saturating_add(1);
        let delay = backoff_delay(base, max, failures);
        warn!(
            attempt = failures,
            delay_secs = delay.as_secs(),
            "orchestrator down; respawning after backoff"
        );
        if !sleep_or_ctrl_c(delay).await {
            break;
        }
        match spawn_orchestrator(root) {
            Ok(child) => spawned = Some(child),
            Err(e) => error!(error = %e, "failed to spawn orchestrator"),
        }
    }

    info!("watchdog stopped");
    Ok(())
}

/// Sleep for `duration`; false means Ctrl-C arrived first.
async fn sleep_or_ctrl_c(duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = tokio::signal::ctrl_c() => false,
    }
}

/// Re-exec this binary as `lookout run --root <root>`, detached from the
/// watchdog's lifetime, with output appended to the orchestrator log.
fn spawn_orchestrator(root: &Path) -> Result<Child> {
    let exe = std::env::current_exe()?;
    let stdout_log = process::open_log(root, "orchestrator")?;
    let stderr_log = stdout_log.try_clone()?;

    let child = Command::new(exe)
        .arg("run")
        .arg("--root")
        .arg(root)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_log))
        .stderr(Stdio::from(stderr_log))
        .kill_on_drop(false)
        .spawn()?;

    info!(pid = child.id().unwrap_or_default(), "orchestrator spawned");
    Ok(child)
}
