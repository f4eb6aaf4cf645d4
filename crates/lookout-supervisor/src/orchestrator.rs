//! The supervision loop.
//!
//! One orchestrator process per project root. On-disk layout:
//!
//! ```text
//! .lookout/supervisor/orchestrator.pid   - liveness marker for this loop
//! .lookout/supervisor/checkpoint.yaml    - last known state of every unit
//! .lookout/supervisor/control/           - operator requests, drained per tick
//! .lookout/logs/<unit>.log               - captured unit stdout/stderr
//! ```
//!
//! Each tick: drain control requests, reap exited children, judge heartbeat
//! staleness, spawn units whose backoff delay has elapsed, then run queue
//! housekeeping (approval deadline sweep, errored-item requeue). State is
//! checkpointed at the end of every tick, so a restarted orchestrator adopts
//! still-running units instead of respawning them. Units fail independently;
//! one unit's crash loop never blocks another's supervision.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Child;
use tracing::{error, info, warn};

use lookout_core::config::Config;
use lookout_core::io::atomic_write;
use lookout_core::paths;
use lookout_core::{approval, store};

use crate::control::{self, ControlAction};
use crate::heartbeat;
use crate::process;
use crate::unit::{backoff_delay, Checkpoint, UnitRecord, UnitStatus};
use crate::{Result, SupervisorError};

// ─── Pid file ─────────────────────────────────────────────────────────────

/// The orchestrator pid recorded for this root, if the file exists and parses.
pub fn recorded_pid(root: &Path) -> Option<u32> {
    let path = paths::orchestrator_pid_path(root);
    let data = std::fs::read_to_string(path).ok()?;
    data.trim().parse().ok()
}

/// The pid of a live orchestrator for this root, if one is running.
pub fn live_pid(root: &Path) -> Option<u32> {
    recorded_pid(root).filter(|&pid| process::is_pid_alive(pid))
}

fn write_pid_file(root: &Path) -> Result<()> {
    let path = paths::orchestrator_pid_path(root);
    atomic_write(&path, std::process::id().to_string().as_bytes())?;
    Ok(())
}

fn remove_pid_file(root: &Path) {
    let _ = std::fs::remove_file(paths::orchestrator_pid_path(root));
}

// ─── Supervised ───────────────────────────────────────────────────────────

/// One unit under supervision: its persisted record plus, when this
/// orchestrator spawned it, the live child handle.
struct Supervised {
    record: UnitRecord,
    /// None for processes adopted from a previous orchestrator's checkpoint;
    /// those can only be signalled by pid, never waited on.
    child: Option<Child>,
}

impl Supervised {
    /// Liveness combining `try_wait` (for our own children) with `kill -0`.
    fn is_alive(&mut self) -> bool {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(_)) => return false,
                Ok(None) => return true,
                Err(_) => {}
            }
        }
        match self.record.pid {
            Some(pid) => process::is_pid_alive(pid),
            None => false,
        }
    }

    /// Exit status for logging, where observable.
    fn exit_detail(&mut self) -> String {
        if let Some(child) = self.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                return match status.code() {
                    Some(code) => format!("exit code {code}"),
                    None => "killed by signal".to_string(),
                };
            }
        }
        "process gone".to_string()
    }
}

/// Fold a checkpoint record into a fresh supervision entry.
///
/// A record with a live pid is adopted as-is. For a dead one, operator
/// intent wins: `stop_requested` keeps it stopped and `Crashed` stays
/// crashed, while anything else is scheduled to start (honoring a backoff
/// deadline that is still in the future).
fn reconcile(mut record: UnitRecord, now: DateTime<Utc>) -> Supervised {
    let alive = record.pid.is_some_and(process::is_pid_alive);
    if alive {
        return Supervised {
            record,
            child: None,
        };
    }

    record.pid = None;
    record.started_at = None;
    if record.stop_requested {
        record.status = UnitStatus::Stopped;
        record.restart_at = None;
    } else if record.status == UnitStatus::Crashed {
        record.restart_at = None;
    } else {
        record.status = UnitStatus::Starting;
        record.restart_at = Some(record.restart_at.filter(|&at| at > now).unwrap_or(now));
    }
    Supervised {
        record,
        child: None,
    }
}

// ─── Restart policy ───────────────────────────────────────────────────────

/// Restart bookkeeping shared by the crash and stale-heartbeat paths.
struct RestartPolicy {
    base: Duration,
    max: Duration,
    ceiling: u32,
}

impl From<&Config> for RestartPolicy {
    fn from(config: &Config) -> Self {
        Self {
            base: config.supervision.restart_base(),
            max: config.supervision.restart_max(),
            ceiling: config.supervision.max_consecutive_failures,
        }
    }
}

/// Count a failure and either schedule the next attempt or give up.
fn schedule_restart(
    record: &mut UnitRecord,
    policy: &RestartPolicy,
    detail: &str,
    now: DateTime<Utc>,
) {
    record.consecutive_failures = record.consecutive_failures.saturating_add(1);
    let failures = record.consecutive_failures;

    if failures >= policy.ceiling {
        record.status = UnitStatus::Crashed;
        record.restart_at = None;
        error!(
            unit = %record.name,
            failures,
            detail,
            "unit failed too many times in a row; not restarting until 'lookout unit start'"
        );
        return;
    }

    let delay = backoff_delay(policy.base, policy.max, failures);
    record.status = UnitStatus::Starting;
    record.restart_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
    warn!(
        unit = %record.name,
        failures,
        delay_secs = delay.as_secs(),
        detail,
        "unit down; restart scheduled"
    );
}

// ─── Orchestrator ─────────────────────────────────────────────────────────

pub struct Orchestrator {
    root: PathBuf,
    config: Config,
    units: BTreeMap<String, Supervised>,
    /// Checkpoint records for units no longer in the config; their processes
    /// are stopped on the first tick.
    retired: Vec<UnitRecord>,
}

impl Orchestrator {
    /// Validate the config, claim the pid file, and reconcile the checkpoint
    /// against the configured units. Nothing is spawned here; the first tick
    /// of [`run`](Self::run) does that.
    pub fn start(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        config.validate_strict()?;

        if let Some(pid) = live_pid(root) {
            return Err(SupervisorError::AlreadyRunning(pid));
        }
        write_pid_file(root)?;

        let mut previous = Checkpoint::load(root)?.map(|c| c.units).unwrap_or_default();

        let now = Utc::now();
        let mut units = BTreeMap::new();
        for unit in config.enabled_units() {
            let supervised = match previous.remove(&unit.name) {
                Some(record) => reconcile(record, now),
                None => {
                    let mut record = UnitRecord::new(&unit.name);
                    record.status = UnitStatus::Starting;
                    record.restart_at = Some(now);
                    Supervised {
                        record,
                        child: None,
                    }
                }
            };
            units.insert(unit.name.clone(), supervised);
        }

        let retired: Vec<UnitRecord> = previous.into_values().collect();

        info!(
            pid = std::process::id(),
            units = units.len(),
            "orchestrator started"
        );

        Ok(Self {
            root: root.to_path_buf(),
            config,
            units,
            retired,
        })
    }

    /// Run the supervision loop until Ctrl-C.
    pub async fn run(mut self) -> Result<()> {
        self.save_checkpoint()?;

        let mut ticker = tokio::time::interval(self.config.supervision.health_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "tick failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    self.shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    async fn tick(&mut self) -> Result<()> {
        let now = Utc::now();
        self.stop_retired().await;
        self.apply_control(now).await?;
        self.check_units(now).await;
        self.spawn_due(now);
        self.queue_housekeeping(now);
        self.save_checkpoint()?;
        Ok(())
    }

    // ── Control requests ──

    async fn apply_control(&mut self, now: DateTime<Utc>) -> Result<()> {
        for request in control::drain(&self.root)? {
            let name = request.unit.clone();
            if !self.units.contains_key(&name) {
                warn!(unit = %name, action = %request.action, "control request for unknown unit");
                continue;
            }
            info!(unit = %name, action = %request.action, "control request");
            match request.action {
                ControlAction::Start => {
                    if let Some(s) = self.units.get_mut(&name) {
                        s.record.stop_requested = false;
                        if !s.is_alive() {
                            // Operator start is a fresh slate: the crash
                            // ceiling and any pending backoff are cleared.
                            s.record.consecutive_failures = 0;
                            s.record.status = UnitStatus::Starting;
                            s.record.restart_at = Some(now);
                        }
                    }
                }
                ControlAction::Stop => {
                    if let Some(s) = self.units.get_mut(&name) {
                        s.record.stop_requested = true;
                    }
                    self.stop_unit(&name).await;
                }
                ControlAction::Restart => {
                    if let Some(s) = self.units.get_mut(&name) {
                        s.record.stop_requested = false;
                        s.record.consecutive_failures = 0;
                    }
                    self.stop_unit(&name).await;
                    if let Some(s) = self.units.get_mut(&name) {
                        s.record.status = UnitStatus::Starting;
                        s.record.restart_at = Some(now);
                    }
                }
            }
        }
        Ok(())
    }

    /// Gracefully stop a unit's process and mark the record stopped.
    async fn stop_unit(&mut self, name: &str) {
        let grace = self.config.supervision.grace_period();
        let Some(supervised) = self.units.get_mut(name) else {
            return;
        };
        if let Some(pid) = supervised.record.pid {
            match process::stop_process(supervised.child.as_mut(), pid, grace).await {
                Ok(true) => warn!(unit = %name, pid, "unit ignored TERM; killed"),
                Ok(false) => {}
                Err(e) => warn!(unit = %name, pid, error = %e, "failed to stop unit"),
            }
        }
        supervised.child = None;
        supervised.record.pid = None;
        supervised.record.started_at = None;
        supervised.record.status = UnitStatus::Stopped;
        supervised.record.restart_at = None;
        info!(unit = %name, "unit stopped");
    }

    // ── Health ──

    /// Reap exited processes and restart stale ones. Every unit is judged on
    /// its own; a failure in one never short-circuits the rest.
    async fn check_units(&mut self, now: DateTime<Utc>) {
        let names: Vec<String> = self.units.keys().cloned().collect();
        for name in names {
            self.check_unit(&name, now).await;
        }
    }

    async fn check_unit(&mut self, name: &str, now: DateTime<Utc>) {
        let Some(unit_cfg) = self.config.unit(name) else {
            return;
        };
        let stale_after = unit_cfg.stale_after();
        let grace = self.config.supervision.grace_period();
        let policy = RestartPolicy::from(&self.config);
        let root = self.root.clone();

        let Some(supervised) = self.units.get_mut(name) else {
            return;
        };
        if supervised.record.pid.is_none() {
            return;
        }

        if !supervised.is_alive() {
            let detail = supervised.exit_detail();
            supervised.child = None;
            supervised.record.pid = None;
            supervised.record.started_at = None;
            if supervised.record.stop_requested {
                supervised.record.status = UnitStatus::Stopped;
                supervised.record.restart_at = None;
                info!(unit = %name, "unit stopped");
            } else {
                schedule_restart(&mut supervised.record, &policy, &detail, now);
            }
            return;
        }

        let stale = match heartbeat::is_stale(&root, name, stale_after, now) {
            Ok(s) => s,
            Err(e) => {
                warn!(unit = %name, error = %e, "heartbeat unreadable");
                false
            }
        };

        if !stale {
            if supervised.record.status != UnitStatus::Running {
                info!(unit = %name, "unit healthy");
            }
            supervised.record.status = UnitStatus::Running;
            supervised.record.consecutive_failures = 0;
            supervised.record.last_healthy_at = Some(now);
            return;
        }

        // Alive but wedged. Persist the unhealthy state (the stop below can
        // take the whole grace period), stop the process, then push it
        // through the same failure path as a crash.
        supervised.record.status = UnitStatus::Unhealthy;
        warn!(unit = %name, "heartbeat stale; restarting unit");
        if let Err(e) = self.save_checkpoint() {
            warn!(error = %e, "checkpoint save failed");
        }

        let Some(supervised) = self.units.get_mut(name) else {
            return;
        };
        if let Some(pid) = supervised.record.pid {
            if let Err(e) = process::stop_process(supervised.child.as_mut(), pid, grace).await {
                warn!(unit = %name, pid, error = %e, "failed to stop stale unit");
            }
        }
        supervised.child = None;
        supervised.record.pid = None;
        supervised.record.started_at = None;
        schedule_restart(&mut supervised.record, &policy, "heartbeat stale", now);
    }

    // ── Spawning ──

    /// Spawn every unit whose restart deadline has passed.
    fn spawn_due(&mut self, now: DateTime<Utc>) {
        let due: Vec<String> = self
            .units
            .values()
            .filter(|s| {
                !s.record.stop_requested && s.record.restart_at.is_some_and(|at| at <= now)
            })
            .map(|s| s.record.name.clone())
            .collect();

        for name in due {
            self.spawn_unit(&name, now);
        }
    }

    fn spawn_unit(&mut self, name: &str, now: DateTime<Utc>) {
        let Some(unit_cfg) = self.config.unit(name).cloned() else {
            return;
        };
        let policy = RestartPolicy::from(&self.config);

        // Seed the heartbeat so staleness is measured from process start.
        if let Err(e) = heartbeat::beat_at(&self.root, name, now) {
            warn!(unit = %name, error = %e, "failed to seed heartbeat");
        }

        match process::spawn_unit(&self.root, &unit_cfg) {
            Ok(child) => {
                let pid = child.id();
                let Some(supervised) = self.units.get_mut(name) else {
                    return;
                };
                supervised.record.status = UnitStatus::Starting;
                supervised.record.pid = pid;
                supervised.record.started_at = Some(now);
                supervised.record.restart_at = None;
                supervised.child = Some(child);
                info!(unit = %name, pid = pid.unwrap_or_default(), "unit spawned");
            }
            Err(e) => {
                error!(unit = %name, error = %e, "failed to spawn unit");
                let Some(supervised) = self.units.get_mut(name) else {
                    return;
                };
                supervised.child = None;
                supervised.record.pid = None;
                schedule_restart(&mut supervised.record, &policy, "spawn failed", now);
            }
        }
    }

    async fn stop_retired(&mut self) {
        if self.retired.is_empty() {
            return;
        }
        let grace = self.config.supervision.grace_period();
        for record in std::mem::take(&mut self.retired) {
            if let Some(pid) = record.pid.filter(|&p| process::is_pid_alive(p)) {
                info!(unit = %record.name, pid, "stopping unit removed from config");
                if let Err(e) = process::stop_process(None, pid, grace).await {
                    warn!(unit = %record.name, error = %e, "failed to stop retired unit");
                }
            }
        }
    }

    // ── Queue housekeeping ──

    /// Queue maintenance that rides the supervision tick: approval deadline
    /// sweeps and requeue of failures interrupted before their retry commit.
    fn queue_housekeeping(&self, now: DateTime<Utc>) {
        match approval::sweep(&self.root, &self.config, now) {
            Ok(report) => {
                if !report.escalated.is_empty() || !report.expired.is_empty() {
                    info!(
                        escalated = report.escalated.len(),
                        expired = report.expired.len(),
                        "approval sweep"
                    );
                }
            }
            Err(e) => warn!(error = %e, "approval sweep failed"),
        }

        match store::requeue_errored(&self.root, &self.config) {
            Ok(requeued) if !requeued.is_empty() => {
                info!(count = requeued.len(), "requeued errored items");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "requeue sweep failed"),
        }
    }

    // ── Persistence / shutdown ──

    fn save_checkpoint(&self) -> Result<()> {
        let units: BTreeMap<String, UnitRecord> = self
            .units
            .iter()
            .map(|(name, s)| (name.clone(), s.record.clone()))
            .collect();
        Checkpoint::new(units).save(&self.root)
    }

    /// Stop every running unit, checkpoint, and release the pid file.
    ///
    /// Units stopped here keep `stop_requested = false`, so the next
    /// orchestrator start brings them back.
    async fn shutdown(&mut self) {
        let names: Vec<String> = self.units.keys().cloned().collect();
        for name in names {
            let alive = self
                .units
                .get_mut(&name)
                .map(|s| s.is_alive())
                .unwrap_or(false);
            if alive {
                self.stop_unit(&name).await;
            }
        }
        if let Err(e) = self.save_checkpoint() {
            warn!(error = %e, "final checkpoint save failed");
        }
        remove_pid_file(&self.root);
        info!("orchestrator stopped");
    }
}

// ─── Status ───────────────────────────────────────────────────────────────

/// Point-in-time view of one unit for `lookout status`.
#[derive(Debug, Clone, Serialize)]
pub struct UnitView {
    pub name: String,
    pub status: UnitStatus,
    pub enabled: bool,
    pub alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat_age_secs: Option<i64>,
    pub heartbeat_stale: bool,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_at: Option<DateTime<Utc>>,
}

/// Orchestrator liveness plus per-unit state, read from disk.
///
/// Works whether or not an orchestrator is running; the checkpoint may be
/// stale, so liveness and heartbeat age are re-derived here.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub orchestrator_alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator_pid: Option<u32>,
    pub units: Vec<UnitView>,
}

pub fn status(root: &Path) -> Result<StatusReport> {
    let config = Config::load(root)?;
    let now = Utc::now();

    let records = Checkpoint::load(root)?.map(|c| c.units).unwrap_or_default();

    let mut units = Vec::new();
    for unit in &config.units {
        let record = records.get(&unit.name);
        let pid = record.and_then(|r| r.pid);
        let alive = pid.is_some_and(process::is_pid_alive);

        let beat = heartbeat::last_beat(root, &unit.name)?;
        let heartbeat_stale =
            alive && heartbeat::is_stale(root, &unit.name, unit.stale_after(), now)?;

        units.push(UnitView {
            name: unit.name.clone(),
            status: record.map(|r| r.status).unwrap_or(UnitStatus::Stopped),
            enabled: unit.enabled,
            alive,
            pid: pid.filter(|_| alive),
            uptime_secs: record
                .and_then(|r| r.started_at)
                .filter(|_| alive)
                .map(|t| now.signed_duration_since(t).num_seconds()),
            heartbeat_age_secs: beat.map(|b| now.signed_duration_since(b).num_seconds()),
            heartbeat_stale,
            consecutive_failures: record.map(|r| r.consecutive_failures).unwrap_or(0),
            restart_at: record.and_then(|r| r.restart_at),
        });
    }

    let pid = recorded_pid(root);
    Ok(StatusReport {
        orchestrator_alive: pid.is_some_and(process::is_pid_alive),
        orchestrator_pid: pid,
        units,
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────
