//! On-disk form of an action item: a YAML header, a `---` separator line,
//! then the free-form payload exactly as submitted.
//!
//! ```text
//! type: action_item
//! source: inbox
//! dedup_key: file-42
//! created_at: 2026-08-20T09:15:00Z
//! status: pending
//! attempt_count: 0
//! updated_at: 2026-08-20T09:15:00Z
//! ---
//! new file: /shared/inbox/report.pdf
//! ```
//!
//! The payload is opaque: it is never parsed, trimmed, or rewritten. Any
//! file that cannot be read back into a valid header is a data fault and
//! gets quarantined by the store rather than retried.

use crate::error::{CoreError, Result};
use crate::item::{ActionItem, ItemState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SEPARATOR: &str = "---";
const RECORD_TYPE: &str = "action_item";

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct RecordHeader {
    #[serde(rename = "type")]
    kind: String,
    source: String,
    dedup_key: String,
    created_at: DateTime<Utc>,
    status: ItemState,
    attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    approval_deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    escalated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Parse / render
// ---------------------------------------------------------------------------

fn malformed(path: &Path, reason: impl Into<String>) -> CoreError {
    CoreError::MalformedRecord {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Parse one item file. `path` is used for error context only; callers
/// decide what to do with a malformed record (the store quarantines it).
pub fn parse_record(path: &Path, content: &str) -> Result<ActionItem> {
    let mut header_end = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == SEPARATOR {
            header_end = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }
    let Some((header_end, body_start)) = header_end else {
        return Err(malformed(path, "missing '---' separator"));
    };

    let header: RecordHeader = serde_yaml::from_str(&content[..header_end])
        .map_err(|e| malformed(path, e.to_string()))?;

    if header.kind != RECORD_TYPE {
        return Err(malformed(
            path,
            format!("unexpected type '{}'", header.kind),
        ));
    }
    if header.status == ItemState::AwaitingApproval && header.approval_deadline.is_none() {
        return Err(malformed(path, "awaiting_approval without approval_deadline"));
    }

    Ok(ActionItem {
        source: header.source,
        dedup_key: header.dedup_key,
        state: header.status,
        created_at: header.created_at,
        updated_at: header.updated_at.unwrap_or(header.created_at),
        attempt_count: header.attempt_count,
        last_error: header.last_error,
        approval_deadline: header.approval_deadline,
        escalated_at: header.escalated_at,
        payload: content[body_start..].to_string(),
    })
}

pub fn render_record(item: &ActionItem) -> Result<String> {
    let header = RecordHeader {
        kind: RECORD_TYPE.to_string(),
        source: item.source.clone(),
        dedup_key: item.dedup_key.clone(),
        created_at: item.created_at,
        status: item.state,
        attempt_count: item.attempt_count,
        last_error: item.last_error.clone(),
        approval_deadline: item.approval_deadline,
        escalated_at: item.escalated_at,
        updated_at: Some(item.updated_at),
    };
    let mut out = serde_yaml::to_string(&header)?;
    out.push_str(SEPARATOR);
    out.push('\n');
    out.push_str(&item.payload);
    Ok(out)
}

/// Collapse a failure message to one line so it fits a header field.
pub fn normalize_error(msg: &str) -> String {
    msg.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
