//! Unit heartbeat files.
//!
//! A watcher proves liveness by rewriting `.lookout/heartbeat/<unit>.hb` on
//! its work loop (`lookout heartbeat --unit <name>` from a shell works too). The
//! orchestrator seeds the file when it spawns the unit, so staleness is
//! measured from a known point, and compares the recorded time against the
//! unit's `stale_after_secs` to catch processes that are alive but wedged.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};

use lookout_core::io::atomic_write;
use lookout_core::paths;

use crate::Result;

/// Record a heartbeat for `unit` now.
pub fn beat(root: &Path, unit: &str) -> Result<()> {
    beat_at(root, unit, Utc::now())
}

/// Record a heartbeat with an explicit timestamp.
pub fn beat_at(root: &Path, unit: &str, at: DateTime<Utc>) -> Result<()> {
    let path = paths::heartbeat_path(root, unit);
    atomic_write(&path, at.to_rfc3339().as_bytes())?;
    Ok(())
}

/// The last recorded heartbeat, or `None` if the unit has never beaten.
///
/// Falls back to the file's mtime when the content does not parse, so a
/// heartbeat written by a plain `touch` still counts.
pub fn last_beat(root: &Path, unit: &str) -> Result<Option<DateTime<Utc>>> {
    let path = paths::heartbeat_path(root, unit);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(&path)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(data.trim()) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    let mtime = std::fs::metadata(&path)?.modified()?;
    Ok(Some(mtime.into()))
}

/// True if the last heartbeat is older than `stale_after` as of `now`.
///
/// A unit with no heartbeat file is not stale; the orchestrator seeds the
/// file at spawn, so that only happens for units that never started.
pub fn is_stale(
    root: &Path,
    unit: &str,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<bool> {
    match last_beat(root, unit)? {
        None => Ok(false),
        Some(ts) => {
            let age = now.signed_duration_since(ts);
            // A heartbeat in the future is clock skew, not staleness.
            Ok(age.to_std().map(|a| a > stale_after).unwrap_or(false))
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
