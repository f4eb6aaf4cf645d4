//! Human approval gate: sensitive items sit in `awaiting_approval` until
//! an operator decides, with a two-stage deadline behind them.
//!
//! Layout:
//!   .lookout/audit.log - append-only JSONL, one entry per gate event
//!
//! Past the soft deadline an item is escalated exactly once (logged and
//! audited, the record keeps the escalation timestamp). Past the hard
//! cutoff it is auto-rejected with reason `deadline_expired`. Nothing in
//! the gate ever silently drops an item.

use crate::config::Config;
use crate::error::Result;
use crate::io;
use crate::item::{ActionItem, ItemId, ItemState};
use crate::paths;
use crate::store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::PoisonError;
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Decision::Approve => f.write_str("approve"),
            Decision::Reject => f.write_str("reject"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Submitted,
    Approved,
    Rejected,
    Escalated,
    Expired,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Submitted => "submitted",
            AuditAction::Approved => "approved",
            AuditAction::Rejected => "rejected",
            AuditAction::Escalated => "escalated",
            AuditAction::Expired => "expired",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub item: String,
    pub action: AuditAction,
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What one deadline sweep did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub escalated: Vec<String>,
    pub expired: Vec<String>,
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

pub(crate) fn append_audit(
    root: &Path,
    item: &ItemId,
    action: AuditAction,
    actor: &str,
    reason: Option<String>,
) -> Result<()> {
    let entry = AuditEntry {
        id: Uuid::new_v4().to_string(),
        item: item.to_string(),
        action,
        actor: actor.to_string(),
        at: Utc::now(),
        reason,
    };
    let mut line = serde_json::to_string(&entry)?;
    line.push('\n');
    io::append_text(&paths::audit_log_path(root), &line)
}

/// Every recorded gate event, oldest first. A line torn by a crash is
/// skipped with a warning rather than taking the whole trail down.
pub fn audit_entries(root: &Path) -> Result<Vec<AuditEntry>> {
    let path = paths::audit_log_path(root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(&path)?;
    let mut entries = Vec::new();
    for line in data.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<AuditEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(error = %e, "skipping unreadable audit line"),
        }
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Gate operations
// ---------------------------------------------------------------------------

/// Route a pending item into the gate with an explicit decision deadline.
pub fn submit_for_approval(
    root: &Path,
    id: &ItemId,
    deadline: DateTime<Utc>,
    actor: &str,
) -> Result<ActionItem> {
    let lock = store::lock_for(id);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let mut item = store::load_for_update(root, id)?;
    item.transition(ItemState::AwaitingApproval)?;
    item.approval_deadline = Some(deadline);
    store::commit(root, &item)?;
    append_audit(root, id, AuditAction::Submitted, actor, None)?;
    info!(item = %id, %deadline, "sent to approval gate");
    Ok(item)
}

/// Apply a human decision to a waiting item. Deciding an item that is not
/// waiting fails without touching the record, so a stale approval screen
/// cannot overwrite a decision already made.
pub fn decide(
    root: &Path,
    id: &ItemId,
    decision: Decision,
    actor: &str,
    reason: Option<String>,
) -> Result<ActionItem> {
    let lock = store::lock_for(id);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let mut item = store::load_for_update(root, id)?;
    let (target, action) = match decision {
        Decision::Approve => (ItemState::Approved, AuditAction::Approved),
        Decision::Reject => (ItemState::Rejected, AuditAction::Rejected),
    };
    item.transition(target)?;
    store::commit(root, &item)?;
    append_audit(root, id, action, actor, reason)?;
    info!(item = %id, %decision, actor, "approval decision recorded");
    Ok(item)
}

/// Walk every waiting item and enforce its deadlines as of `now`.
///
/// The soft deadline escalates once; the record keeps the escalation
/// timestamp so a restarted process does not nag twice. The hard cutoff
/// sits the same distance past the soft deadline as configured globally,
/// and expires the item into `rejected`.
pub fn sweep(root: &Path, cfg: &Config, now: DateTime<Utc>) -> Result<SweepReport> {
    let hard_lag = cfg.approval.hard_cutoff() - cfg.approval.soft_deadline();
    let mut report = SweepReport::default();

    for waiting in store::list(root, Some(ItemState::AwaitingApproval))? {
        let id = waiting.id();
        let lock = store::lock_for(&id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut item = store::load_for_update(root, &id)?;
        if item.state != ItemState::AwaitingApproval {
            continue;
        }
        let Some(deadline) = item.approval_deadline else {
            continue;
        };

        if now >= deadline + hard_lag {
            item.last_error = Some("deadline_expired".to_string());
            item.transition(ItemState::Rejected)?;
            store::commit(root, &item)?;
            append_audit(
                root,
                &id,
                AuditAction::Expired,
                "lookout",
                Some("deadline_expired".to_string()),
            )?;
            warn!(item = %id, %deadline, "approval window expired, auto-rejected");
            report.expired.push(id.to_string());
        } else if now >= deadline && item.escalated_at.is_none() {
            item.escalated_at = Some(now);
            store::commit(root, &item)?;
            append_audit(root, &id, AuditAction::Escalated, "lookout", None)?;
            warn!(item = %id, %deadline, "approval deadline passed, escalating");
            report.escalated.push(id.to_string());
        }
    }
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::store::{claim, get, submit, CandidateEvent, Submission};
    use chrono::Duration;
    use tempfile::TempDir;

    fn sensitive_item(root: &Path, cfg: &Config, key: &str) -> ItemId {
        let ev = CandidateEvent {
            id: ItemId::new("gmail", key).unwrap(),
            payload: "subject: wire transfer\n".to_string(),
            sensitive: true,
        };
        match submit(root, cfg, ev).unwrap() {
            Submission::Created(item) => item.id(),
            Submission::Duplicate => panic!("expected creation"),
        }
    }

    fn plain_item(root: &Path, cfg: &Config, key: &str) -> ItemId {
        let ev = CandidateEvent {
            id: ItemId::new("inbox", key).unwrap(),
            payload: "event\n".to_string(),
            sensitive: false,
        };
        match submit(root, cfg, ev).unwrap() {
            Submission::Created(item) => item.id(),
            Submission::Duplicate => panic!("expected creation"),
        }
    }

    #[test]
    fn submit_for_approval_sets_deadline() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let id = plain_item(dir.path(), &cfg, "msg-1");
        let deadline = Utc::now() + Duration::hours(4);

        let item = submit_for_approval(dir.path(), &id, deadline, "operator").unwrap();
        assert_eq!(item.state, ItemState::AwaitingApproval);
        assert_eq!(item.approval_deadline, Some(deadline));

        let actions: Vec<_> = audit_entries(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec![AuditAction::Submitted]);
    }

    #[test]
    fn approve_unblocks_claim() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let id = sensitive_item(dir.path(), &cfg, "msg-1");

        assert!(claim(dir.path(), &id).is_err());
        let item = decide(dir.path(), &id, Decision::Approve, "casey", None).unwrap();
        assert_eq!(item.state, ItemState::Approved);
        claim(dir.path(), &id).unwrap();
    }

    #[test]
    fn reject_is_terminal() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let id = sensitive_item(dir.path(), &cfg, "msg-1");

        let item = decide(
            dir.path(),
            &id,
            Decision::Reject,
            "casey",
            Some("not actionable".to_string()),
        )
        .unwrap();
        assert_eq!(item.state, ItemState::Rejected);
        assert!(claim(dir.path(), &id).is_err());

        let entries = audit_entries(dir.path()).unwrap();
        let reject = entries.last().unwrap();
        assert_eq!(reject.action, AuditAction::Rejected);
        assert_eq!(reject.actor, "casey");
        assert_eq!(reject.reason.as_deref(), Some("not actionable"));
    }

    #[test]
    fn deciding_twice_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let id = sensitive_item(dir.path(), &cfg, "msg-1");

        decide(dir.path(), &id, Decision::Approve, "casey", None).unwrap();
        let err = decide(dir.path(), &id, Decision::Reject, "jamie", None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(get(dir.path(), &id).unwrap().state, ItemState::Approved);
    }

    #[test]
    fn deciding_plain_pending_item_fails() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let id = plain_item(dir.path(), &cfg, "msg-2");
        let err = decide(dir.path(), &id, Decision::Approve, "casey", None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn sweep_escalates_exactly_once() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let id = sensitive_item(dir.path(), &cfg, "msg-1");
        let deadline = get(dir.path(), &id).unwrap().approval_deadline.unwrap();

        // One hour past the soft deadline.
        let after_soft = deadline + Duration::hours(1);
        let first = sweep(dir.path(), &cfg, after_soft).unwrap();
        assert_eq!(first.escalated, vec![id.to_string()]);
        assert!(first.expired.is_empty());

        // Sweeping again later must not escalate a second time.
        let second = sweep(dir.path(), &cfg, after_soft + Duration::hours(6)).unwrap();
        assert!(second.escalated.is_empty());
        assert!(second.expired.is_empty());

        let escalations = audit_entries(dir.path())
            .unwrap()
            .into_iter()
            .filter(|e| e.action == AuditAction::Escalated)
            .count();
        assert_eq!(escalations, 1);
        assert!(get(dir.path(), &id).unwrap().escalated_at.is_some());
    }

    #[test]
    fn sweep_expires_at_hard_cutoff() {
        let dir = TempDir::new().unwrap();
        // Soft deadline 24h, hard cutoff 7d: expiry lands 6d after the
        // per-item deadline.
        let cfg = Config::default();
        let id = sensitive_item(dir.path(), &cfg, "msg-1");
        let deadline = get(dir.path(), &id).unwrap().approval_deadline.unwrap();

        sweep(dir.path(), &cfg, deadline + Duration::hours(1)).unwrap();

        let just_before = deadline + Duration::days(6) - Duration::seconds(1);
        let report = sweep(dir.path(), &cfg, just_before).unwrap();
        assert!(report.expired.is_empty());

        let report = sweep(dir.path(), &cfg, deadline + Duration::days(6)).unwrap();
        assert_eq!(report.expired, vec![id.to_string()]);

        let item = get(dir.path(), &id).unwrap();
        assert_eq!(item.state, ItemState::Rejected);
        assert_eq!(item.last_error.as_deref(), Some("deadline_expired"));
        let entries = audit_entries(dir.path()).unwrap();
        assert!(entries
            .iter()
            .any(|e| e.action == AuditAction::Expired
                && e.reason.as_deref() == Some("deadline_expired")));
    }

    #[test]
    fn sweep_ignores_decided_items() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let id = sensitive_item(dir.path(), &cfg, "msg-1");
        decide(dir.path(), &id, Decision::Approve, "casey", None).unwrap();

        let report = sweep(dir.path(), &cfg, Utc::now() + Duration::days(30)).unwrap();
        assert!(report.escalated.is_empty());
        assert!(report.expired.is_empty());
        assert_eq!(get(dir.path(), &id).unwrap().state, ItemState::Approved);
    }

    #[test]
    fn audit_survives_torn_line() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let id = sensitive_item(dir.path(), &cfg, "msg-1");
        decide(dir.path(), &id, Decision::Approve, "casey", None).unwrap();

        let path = paths::audit_log_path(dir.path());
        let mut data = std::fs::read_to_string(&path).unwrap();
        data.push_str("{\"id\":\"truncat");
        std::fs::write(&path, data).unwrap();

        let entries = audit_entries(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
