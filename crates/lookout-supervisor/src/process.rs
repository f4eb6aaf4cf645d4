//! Child process lifecycle for supervised units.
//!
//! Units are spawned with stdout and stderr appended to a per-unit log under
//! `.lookout/logs/`. Signalling goes through the `kill` binary so the same
//! code path works for children of this orchestrator and for processes
//! adopted from an earlier orchestrator's checkpoint.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};

use lookout_core::config::UnitConfig;
use lookout_core::paths;

use crate::{Result, SupervisorError};

// ─── Spawning ─────────────────────────────────────────────────────────────

/// Spawn `unit`'s command with stdout and stderr appended to its log file.
pub fn spawn_unit(root: &Path, unit: &UnitConfig) -> Result<Child> {
    let log = open_log(root, &unit.name)?;
    let log_err = log.try_clone()?;

    let mut cmd = Command::new(&unit.command);
    cmd.args(&unit.args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        // Children must survive an orchestrator crash so a restarted
        // orchestrator can adopt them from the checkpoint.
        .kill_on_drop(false);

    cmd.spawn().map_err(|e| {
        SupervisorError::Process(format!("failed to spawn unit '{}': {e}", unit.name))
    })
}

/// Open (creating if needed) the append-mode log file for `unit`.
pub(crate) fn open_log(root: &Path, unit: &str) -> Result<std::fs::File> {
    let path = paths::unit_log_path(root, unit);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    Ok(file)
}

// ─── Signals (Unix) ───────────────────────────────────────────────────────

/// Returns true if the process is still alive (`kill -0 {pid}`).
pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        // TODO: Windows support via winapi or tasklist
        let _ = pid;
        false
    }
}

/// Send SIGTERM (`kill -TERM {pid}`).
pub fn terminate_pid(pid: u32) -> Result<()> {
    signal_pid(pid, "-TERM")
}

/// Send SIGKILL (`kill -KILL {pid}`). Last resort after the grace period.
pub fn kill_pid(pid: u32) -> Result<()> {
    signal_pid(pid, "-KILL")
}

fn signal_pid(pid: u32, signal: &str) -> Result<()> {
    #[cfg(unix)]
    {
        let status = std::process::Command::new("kill")
            .args([signal, &pid.to_string()])
            .status()?;
        if !status.success() {
            return Err(SupervisorError::Process(format!(
                "kill {signal} {pid} failed with exit code {:?}",
                status.code()
            )));
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        // TODO: Windows support via taskkill
        let _ = (pid, signal);
        Err(SupervisorError::Process(
            "signalling processes is not supported on Windows".into(),
        ))
    }
}

// ─── Graceful stop ────────────────────────────────────────────────────────

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Stop a process: SIGTERM, wait up to `grace`, then SIGKILL.
///
/// `child` is present only for processes this orchestrator spawned; adopted
/// processes are signalled by pid and polled for exit. Returns true if the
/// process had to be SIGKILLed.
pub async fn stop_process(child: Option<&mut Child>, pid: u32, grace: Duration) -> Result<bool> {
    let mut child = child;
    if !is_pid_alive(pid) {
        reap(&mut child);
        return Ok(false);
    }

    if let Err(e) = terminate_pid(pid) {
        // The process can exit between the liveness check and the signal;
        // a failed TERM on a dead pid counts as stopped.
        if !is_pid_alive(pid) {
            reap(&mut child);
            return Ok(false);
        }
        return Err(e);
    }

    match child {
        Some(c) => match tokio::time::timeout(grace, c.wait()).await {
            Ok(res) => {
                res?;
                Ok(false)
            }
            Err(_) => {
                c.start_kill()?;
                let _ = c.wait().await;
                Ok(true)
            }
        },
        None => {
            let deadline = tokio::time::Instant::now() + grace;
            while tokio::time::Instant::now() < deadline {
                if !is_pid_alive(pid) {
                    return Ok(false);
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            if is_pid_alive(pid) {
                kill_pid(pid)?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }
}

fn reap(child: &mut Option<&mut Child>) {
    if let Some(c) = child {
        let _ = c.try_wait();
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
