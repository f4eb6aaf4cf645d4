use crate::error::{CoreError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const LOOKOUT_DIR: &str = ".lookout";
pub const ITEMS_DIR: &str = ".lookout/items";
pub const QUARANTINE_DIR: &str = ".lookout/quarantine";
pub const DEDUP_DIR: &str = ".lookout/dedup";
pub const HEARTBEAT_DIR: &str = ".lookout/heartbeat";
pub const SUPERVISOR_DIR: &str = ".lookout/supervisor";
pub const CONTROL_DIR: &str = ".lookout/supervisor/control";
pub const UNIT_LOGS_DIR: &str = ".lookout/logs";

pub const CONFIG_FILE: &str = ".lookout/config.yaml";
pub const AUDIT_FILE: &str = ".lookout/audit.log";
pub const CHECKPOINT_FILE: &str = ".lookout/supervisor/checkpoint.yaml";
pub const ORCHESTRATOR_PID_FILE: &str = ".lookout/supervisor/orchestrator.pid";

pub const ITEM_EXT: &str = "item";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn lookout_dir(root: &Path) -> PathBuf {
    root.join(LOOKOUT_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn items_dir(root: &Path) -> PathBuf {
    root.join(ITEMS_DIR)
}

pub fn source_dir(root: &Path, source: &str) -> PathBuf {
    root.join(ITEMS_DIR).join(source)
}

pub fn item_path(root: &Path, source: &str, key: &str) -> PathBuf {
    source_dir(root, source).join(format!("{key}.{ITEM_EXT}"))
}

pub fn quarantine_dir(root: &Path) -> PathBuf {
    root.join(QUARANTINE_DIR)
}

pub fn quarantine_source_dir(root: &Path, source: &str) -> PathBuf {
    root.join(QUARANTINE_DIR).join(source)
}

pub fn dedup_log_path(root: &Path, source: &str) -> PathBuf {
    root.join(DEDUP_DIR).join(format!("{source}.log"))
}

pub fn audit_log_path(root: &Path) -> PathBuf {
    root.join(AUDIT_FILE)
}

pub fn heartbeat_path(root: &Path, unit: &str) -> PathBuf {
    root.join(HEARTBEAT_DIR).join(format!("{unit}.hb"))
}

pub fn supervisor_dir(root: &Path) -> PathBuf {
    root.join(SUPERVISOR_DIR)
}

pub fn checkpoint_path(root: &Path) -> PathBuf {
    root.join(CHECKPOINT_FILE)
}

pub fn control_dir(root: &Path) -> PathBuf {
    root.join(CONTROL_DIR)
}

pub fn orchestrator_pid_path(root: &Path) -> PathBuf {
    root.join(ORCHESTRATOR_PID_FILE)
}

pub fn unit_log_path(root: &Path, unit: &str) -> PathBuf {
    root.join(UNIT_LOGS_DIR).join(format!("{unit}.log"))
}

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Unit names, event sources, and dedup keys all share one naming rule:
/// lowercase alphanumeric with interior hyphens, at most 64 bytes. The
/// names become filenames, so nothing looser is accepted.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(CoreError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_slugs() {
        for slug in ["inbox", "a", "file-42", "gmail-work", "x1"] {
            validate_slug(slug).unwrap_or_else(|_| panic!("expected valid: {slug}"));
        }
    }

    #[test]
    fn invalid_slugs() {
        for slug in [
            "",
            "-starts-with-dash",
            "ends-with-dash-",
            "has spaces",
            "UPPER",
            "a_b",
            "dots.are.out",
        ] {
            assert!(validate_slug(slug).is_err(), "expected invalid: {slug}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.lookout/config.yaml")
        );
        assert_eq!(
            item_path(root, "inbox", "file-42"),
            PathBuf::from("/tmp/proj/.lookout/items/inbox/file-42.item")
        );
        assert_eq!(
            dedup_log_path(root, "inbox"),
            PathBuf::from("/tmp/proj/.lookout/dedup/inbox.log")
        );
        assert_eq!(
            heartbeat_path(root, "gmail"),
            PathBuf::from("/tmp/proj/.lookout/heartbeat/gmail.hb")
        );
    }
}
