//! Supervised unit state.
//!
//! A unit is one configured watcher command. The orchestrator tracks each
//! unit's runtime state in a [`UnitRecord`] and persists the full set as a
//! [`Checkpoint`] at `.lookout/supervisor/checkpoint.yaml`, so a restarted
//! orchestrator can adopt still-running processes instead of respawning them.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lookout_core::io::atomic_write;
use lookout_core::paths;

use crate::Result;

// ─── UnitStatus ───────────────────────────────────────────────────────────

/// Lifecycle status of a supervised unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Spawned (or scheduled to spawn) but not yet through a health check.
    Starting,
    /// Alive with a fresh heartbeat as of the last health check.
    Running,
    /// Alive but the heartbeat went stale; being stopped for a restart.
    Unhealthy,
    /// Stopped by an operator or a clean shutdown; not restarted.
    Stopped,
    /// Failed `max_consecutive_failures` times in a row; stays down until an
    /// explicit `lookout unit start`.
    Crashed,
}

impl UnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Starting => "starting",
            UnitStatus::Running => "running",
            UnitStatus::Unhealthy => "unhealthy",
            UnitStatus::Stopped => "stopped",
            UnitStatus::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── UnitRecord ───────────────────────────────────────────────────────────

/// Runtime state of one unit, as persisted in the checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitRecord {
    pub name: String,
    pub status: UnitStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_healthy_at: Option<DateTime<Utc>>,
    /// Failures since the unit last passed a health check.
    #[serde(default)]
    pub consecutive_failures: u32,
    /// When the next restart attempt is due, if one is scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_at: Option<DateTime<Utc>>,
    /// Set by `lookout unit stop`; survives orchestrator restarts so a
    /// stopped unit stays stopped.
    #[serde(default)]
    pub stop_requested: bool,
}

impl UnitRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: UnitStatus::Stopped,
            pid: None,
            started_at: None,
            last_healthy_at: None,
            consecutive_failures: 0,
            restart_at: None,
            stop_requested: false,
        }
    }
}

// ─── Backoff ──────────────────────────────────────────────────────────────

/// Restart delay before attempt `failures` (1-based): `base * 2^(failures - 1)`,
/// capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exp = failures.saturating_sub(1).min(32);
    let factor = 2u32.saturating_pow(exp);
    base.saturating_mul(factor).min(max)
}

// ─── Checkpoint ───────────────────────────────────────────────────────────

/// Snapshot of every unit's [`UnitRecord`], atomically rewritten after each
/// orchestrator tick that changed state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub units: BTreeMap<String, UnitRecord>,
}

impl Checkpoint {
    pub fn new(units: BTreeMap<String, UnitRecord>) -> Self {
        Self {
            saved_at: Utc::now(),
            units,
        }
    }

    /// Load the checkpoint, or `None` if no orchestrator has ever run here.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = paths::checkpoint_path(root);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        let checkpoint: Checkpoint = serde_yaml::from_str(&data)?;
        Ok(Some(checkpoint))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::checkpoint_path(root);
        let data = serde_yaml::to_string(self)?;
        atomic_write(&path, data.as_bytes())?;
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backoff_doubles_from_base() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(60);
        assert_eq!(backoff_delay(base, max, 1), Duration::from_secs(5));
        assert_eq!(backoff_delay(base, max, 2), Duration::from_secs(10));
        assert_eq!(backoff_delay(base, max, 3), Duration::from_secs(20));
        assert_eq!(backoff_delay(base, max, 4), Duration::from_secs(40));
    }

    #[test]
    fn backoff_is_monotonic_up_to_the_cap() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(60);
        let mut prev = Duration::ZERO;
        for n in 1..=12 {
            let d = backoff_delay(base, max, n);
            assert!(d >= prev, "delay shrank at attempt {n}");
            assert!(d <= max);
            prev = d;
        }
        assert_eq!(prev, max);
    }

    #[test]
    fn backoff_survives_huge_failure_counts() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(60);
        assert_eq!(backoff_delay(base, max, u32::MAX), max);
    }

    #[test]
    fn status_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&UnitStatus::Starting).unwrap();
        assert_eq!(yaml.trim(), "starting");
        assert_eq!(UnitStatus::Crashed.to_string(), "crashed");
    }

    #[test]
    fn checkpoint_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut units = BTreeMap::new();
        let mut rec = UnitRecord::new("inbox-watcher");
        rec.status = UnitStatus::Running;
        rec.pid = Some(4242);
        rec.consecutive_failures = 2;
        units.insert("inbox-watcher".to_string(), rec);

        Checkpoint::new(units).save(dir.path()).unwrap();

        let loaded = Checkpoint::load(dir.path()).unwrap().unwrap();
        let rec = &loaded.units["inbox-watcher"];
        assert_eq!(rec.status, UnitStatus::Running);
        assert_eq!(rec.pid, Some(4242));
        assert_eq!(rec.consecutive_failures, 2);
        assert!(!rec.stop_requested);
    }

    #[test]
    fn missing_checkpoint_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(Checkpoint::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn minimal_record_yaml_fills_defaults() {
        let yaml = "name: inbox-watcher\nstatus: stopped\n";
        let rec: UnitRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rec.status, UnitStatus::Stopped);
        assert_eq!(rec.pid, None);
        assert_eq!(rec.restart_at, None);
        assert_eq!(rec.consecutive_failures, 0);
        assert!(!rec.stop_requested);
    }
}
