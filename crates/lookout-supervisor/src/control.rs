//! Operator control channel.
//!
//! `lookout unit start|stop|restart` does not signal processes directly; it
//! drops a YAML request into `.lookout/supervisor/control/` and the running
//! orchestrator drains the directory on its next tick. Requests are written
//! atomically and named by uuid, so concurrent operators never collide.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use lookout_core::io::atomic_write;
use lookout_core::paths;

use crate::Result;

// ─── Types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Restart => "restart",
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub id: Uuid,
    pub action: ControlAction,
    pub unit: String,
    pub requested_at: DateTime<Utc>,
}

impl ControlRequest {
    pub fn new(action: ControlAction, unit: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            unit: unit.into(),
            requested_at: Utc::now(),
        }
    }
}

// ─── Submit / drain ───────────────────────────────────────────────────────

/// Write a request into the control directory. Returns the file path.
pub fn submit(root: &Path, request: &ControlRequest) -> Result<PathBuf> {
    let path = paths::control_dir(root).join(format!("{}.yaml", request.id));
    let data = serde_yaml::to_string(request)?;
    atomic_write(&path, data.as_bytes())?;
    Ok(path)
}

/// Read and remove every pending request, oldest first.
///
/// A file that does not parse is logged and removed; leaving it behind would
/// wedge the channel on every subsequent tick.
pub fn drain(root: &Path) -> Result<Vec<ControlRequest>> {
    let dir = paths::control_dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut requests = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let data = match std::fs::read_to_string(&path) {
            Ok(d) => d,
            Err(_) => continue,
        };
        match serde_yaml::from_str::<ControlRequest>(&data) {
            Ok(request) => requests.push(request),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "discarding malformed control request");
            }
        }
        std::fs::remove_file(&path)?;
    }

    requests.sort_by_key(|r| r.requested_at);
    Ok(requests)
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn submit_then_drain_roundtrip() {
        let dir = TempDir::new().unwrap();
        let request = ControlRequest::new(ControlAction::Restart, "inbox-watcher");
        submit(dir.path(), &request).unwrap();

        let drained = drain(dir.path()).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].action, ControlAction::Restart);
        assert_eq!(drained[0].unit, "inbox-watcher");
        assert_eq!(drained[0].id, request.id);

        // Drained requests are gone.
        assert!(drain(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn drain_orders_oldest_first() {
        let dir = TempDir::new().unwrap();

        let newer = ControlRequest::new(ControlAction::Stop, "inbox-watcher");
        let mut older = ControlRequest::new(ControlAction::Start, "inbox-watcher");
        older.requested_at = Utc::now() - chrono::Duration::seconds(30);

        // Submission order is newest first; drain must sort by request time.
        submit(dir.path(), &newer).unwrap();
        submit(dir.path(), &older).unwrap();

        let drained = drain(dir.path()).unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].action, ControlAction::Start);
        assert_eq!(drained[1].action, ControlAction::Stop);
    }

    #[test]
    fn malformed_request_is_discarded() {
        let dir = TempDir::new().unwrap();
        let path = paths::control_dir(dir.path()).join("junk.yaml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not: [a, control, request").unwrap();

        assert!(drain(dir.path()).unwrap().is_empty());
        assert!(!path.exists(), "malformed file should be removed");
    }

    #[test]
    fn drain_without_control_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(drain(dir.path()).unwrap().is_empty());
    }
}
