//! Per-source duplicate suppression.
//!
//! Layout: one append-only log per event source at
//! `.lookout/dedup/<source>.log`, one `key<TAB>first_seen_at` line per
//! entry. The log is a fast path, not the truth: item creation uses an
//! exclusive filesystem create, and the store heals the log when it finds
//! an item the log does not know about. Entries are appended only after
//! the item file exists, so a crash between the two leaves a resubmittable
//! event, never a stranded one.

use crate::error::Result;
use crate::io;
use crate::paths;
use chrono::Utc;
use std::path::Path;

/// Has `key` ever been recorded for `source`?
pub fn seen(root: &Path, source: &str, key: &str) -> Result<bool> {
    let path = paths::dedup_log_path(root, source);
    if !path.exists() {
        return Ok(false);
    }
    let data = std::fs::read_to_string(&path)?;
    Ok(data
        .lines()
        .filter_map(|l| l.split_once('\t'))
        .any(|(k, _)| k == key))
}

/// Record `key` for `source`. Appending the same key twice is harmless.
pub fn record(root: &Path, source: &str, key: &str) -> Result<()> {
    let path = paths::dedup_log_path(root, source);
    // A crash can tear the final line; start on a fresh one if so.
    let lead = match std::fs::read_to_string(&path) {
        Ok(data) if !data.is_empty() && !data.ends_with('\n') => "\n",
        _ => "",
    };
    io::append_text(
        &path,
        &format!("{lead}{key}\t{}\n", Utc::now().to_rfc3339()),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unseen_until_recorded() {
        let dir = TempDir::new().unwrap();
        assert!(!seen(dir.path(), "inbox", "file-42").unwrap());
        record(dir.path(), "inbox", "file-42").unwrap();
        assert!(seen(dir.path(), "inbox", "file-42").unwrap());
    }

    #[test]
    fn sources_are_isolated() {
        let dir = TempDir::new().unwrap();
        record(dir.path(), "inbox", "file-42").unwrap();
        assert!(!seen(dir.path(), "gmail", "file-42").unwrap());
    }

    #[test]
    fn repeated_record_is_harmless() {
        let dir = TempDir::new().unwrap();
        record(dir.path(), "inbox", "file-42").unwrap();
        record(dir.path(), "inbox", "file-42").unwrap();
        assert!(seen(dir.path(), "inbox", "file-42").unwrap());
    }

    #[test]
    fn torn_final_line_is_ignored_and_repaired() {
        let dir = TempDir::new().unwrap();
        record(dir.path(), "inbox", "file-1").unwrap();
        // Simulate a crash mid-append: partial key, no tab, no newline.
        let log = paths::dedup_log_path(dir.path(), "inbox");
        let mut data = std::fs::read_to_string(&log).unwrap();
        data.push_str("file-4");
        std::fs::write(&log, &data).unwrap();

        assert!(!seen(dir.path(), "inbox", "file-4").unwrap());
        record(dir.path(), "inbox", "file-42").unwrap();
        assert!(seen(dir.path(), "inbox", "file-42").unwrap());
        assert!(seen(dir.path(), "inbox", "file-1").unwrap());
    }

    #[test]
    fn exact_key_match_only() {
        let dir = TempDir::new().unwrap();
        record(dir.path(), "inbox", "file-421").unwrap();
        assert!(!seen(dir.path(), "inbox", "file-42").unwrap());
    }
}
