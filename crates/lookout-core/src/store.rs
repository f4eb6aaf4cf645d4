//! Durable action-item store: one file per item, every change committed
//! by an atomic rename.
//!
//! Layout:
//!   .lookout/items/<source>/<key>.item       live records
//!   .lookout/quarantine/<source>/<key>.item  records pulled from rotation
//!
//! Creation is the dedup commit point: an exclusive create either lands
//! the one record a `(source, key)` pair will ever have, or reports that
//! the pair is taken. Mutations go through a per-item lock, re-validate
//! the lifecycle edge against what is on disk, and rewrite the whole
//! file. Records that fail to parse are moved to quarantine and counted
//! separately; they are never retried and never block their source.

use crate::approval::{self, AuditAction};
use crate::config::Config;
use crate::dedup;
use crate::error::{CoreError, Result};
use crate::io;
use crate::item::{ActionItem, ItemId, ItemState};
use crate::paths;
use crate::record;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A raw observation handed over by a perception unit. Carries everything
/// needed to decide admission; the payload is stored untouched.
#[derive(Debug, Clone)]
pub struct CandidateEvent {
    pub id: ItemId,
    pub payload: String,
    pub sensitive: bool,
}

/// What became of a submitted candidate.
#[derive(Debug, Clone)]
pub enum Submission {
    Created(ActionItem),
    Duplicate,
}

/// Consumer verdict on a claimed item.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemCounts {
    pub by_state: BTreeMap<String, usize>,
    pub quarantined: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuarantineEntry {
    pub source: String,
    pub file: String,
}

// ---------------------------------------------------------------------------
// Per-item serialization
// ---------------------------------------------------------------------------

static ITEM_LOCKS: OnceLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> = OnceLock::new();

/// One lock per item id. Claims and reports serialize on it so two
/// in-process callers cannot interleave a load-mutate-save; unrelated
/// items never contend.
fn item_lock(id: &ItemId) -> Arc<Mutex<()>> {
    let map = ITEM_LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = map.lock().unwrap_or_else(PoisonError::into_inner);
    map.entry(id.to_string()).or_default().clone()
}

// ---------------------------------------------------------------------------
// Internal file I/O
// ---------------------------------------------------------------------------

fn save_item(root: &Path, item: &ActionItem) -> Result<()> {
    let path = paths::item_path(root, &item.source, &item.dedup_key);
    let data = record::render_record(item)?;
    io::atomic_write(&path, data.as_bytes())
}

/// Load the record at `path`, quarantining it if it cannot be trusted.
fn load_at(root: &Path, path: &Path) -> Result<ActionItem> {
    let content = std::fs::read_to_string(path)?;
    let parsed = record::parse_record(path, &content);

    let reason = match parsed {
        Ok(item) => {
            let expected_key = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let expected_source = path
                .parent()
                .and_then(|p| p.file_name())
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if item.source == expected_source && item.dedup_key == expected_key {
                return Ok(item);
            }
            format!(
                "header identity {}:{} does not match path",
                item.source, item.dedup_key
            )
        }
        Err(CoreError::MalformedRecord { reason, .. }) => reason,
        Err(e) => return Err(e),
    };

    quarantine_file(root, path, &reason)?;
    Err(CoreError::Quarantined {
        item: path.display().to_string(),
        reason,
    })
}

fn load_item(root: &Path, id: &ItemId) -> Result<ActionItem> {
    let path = paths::item_path(root, &id.source, &id.key);
    if !path.exists() {
        return Err(CoreError::ItemNotFound(id.to_string()));
    }
    load_at(root, &path)
}

/// Pull a record out of rotation. Data faults land here so one bad file
/// cannot wedge its source; the operator inspects and resubmits.
fn quarantine_file(root: &Path, path: &Path, reason: &str) -> Result<()> {
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let source = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string());
    let dest = paths::quarantine_source_dir(root, &source).join(&file);
    warn!(%source, %file, reason, "quarantining unreadable item record");
    io::move_file(path, &dest)
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Admit a candidate event, exactly once per `(source, key)` for all time.
///
/// The dedup log is consulted first; the exclusive create of the item file
/// settles any race the log cannot see. Resubmissions of finished items
/// are discarded like any other duplicate. Sensitive candidates are
/// admitted straight into the approval gate with the configured decision
/// deadline.
pub fn submit(root: &Path, cfg: &Config, event: CandidateEvent) -> Result<Submission> {
    let id = event.id.clone();
    let lock = item_lock(&id);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    if dedup::seen(root, &id.source, &id.key)? {
        return Ok(Submission::Duplicate);
    }

    let mut item = ActionItem::new(id.clone(), event.payload);
    if event.sensitive {
        item.state = ItemState::AwaitingApproval;
        item.approval_deadline = Some(item.created_at + cfg.approval.soft_deadline());
    }

    let path = paths::item_path(root, &id.source, &id.key);
    let data = record::render_record(&item)?;
    if !io::atomic_create_new(&path, data.as_bytes())? {
        // The record exists but the log missed it, likely a crash between
        // the two writes. Heal the log and discard.
        dedup::record(root, &id.source, &id.key)?;
        return Ok(Submission::Duplicate);
    }
    dedup::record(root, &id.source, &id.key)?;

    if event.sensitive {
        approval::append_audit(root, &id, AuditAction::Submitted, &id.source, None)?;
    }
    info!(item = %id, state = %item.state, "admitted action item");
    Ok(Submission::Created(item))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub fn get(root: &Path, id: &ItemId) -> Result<ActionItem> {
    load_item(root, id)
}

/// All live items, oldest first, optionally narrowed to one state.
/// Unreadable records are quarantined along the way rather than aborting
/// the listing.
pub fn list(root: &Path, state: Option<ItemState>) -> Result<Vec<ActionItem>> {
    let dir = paths::items_dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut items = Vec::new();
    for source_entry in std::fs::read_dir(&dir)? {
        let source_entry = source_entry?;
        if !source_entry.file_type()?.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(source_entry.path())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(paths::ITEM_EXT) {
                continue;
            }
            match load_at(root, &path) {
                Ok(item) => {
                    if state.map_or(true, |s| item.state == s) {
                        items.push(item);
                    }
                }
                Err(CoreError::Quarantined { .. }) => {}
                Err(e) => return Err(e),
            }
        }
    }
    items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(items)
}

pub fn counts(root: &Path) -> Result<ItemCounts> {
    let items = list(root, None)?;
    let mut by_state: BTreeMap<String, usize> = BTreeMap::new();
    for state in ItemState::all() {
        by_state.insert(state.as_str().to_string(), 0);
    }
    for item in &items {
        *by_state.entry(item.state.as_str().to_string()).or_default() += 1;
    }
    let quarantined = quarantined(root)?.len();
    Ok(ItemCounts {
        total: items.len(),
        by_state,
        quarantined,
    })
}

pub fn quarantined(root: &Path) -> Result<Vec<QuarantineEntry>> {
    let dir = paths::quarantine_dir(root);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for source_entry in std::fs::read_dir(&dir)? {
        let source_entry = source_entry?;
        if !source_entry.file_type()?.is_dir() {
            continue;
        }
        let source = source_entry.file_name().to_string_lossy().into_owned();
        for entry in std::fs::read_dir(source_entry.path())? {
            let file = entry?.file_name().to_string_lossy().into_owned();
            entries.push(QuarantineEntry {
                source: source.clone(),
                file,
            });
        }
    }
    entries.sort_by(|a, b| (&a.source, &a.file).cmp(&(&b.source, &b.file)));
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Claim / report
// ---------------------------------------------------------------------------

/// Take exclusive ownership of an item for execution. Exactly one caller
/// wins; the rest get `ClaimConflict` and the record is left untouched.
pub fn claim(root: &Path, id: &ItemId) -> Result<ActionItem> {
    let lock = item_lock(id);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let mut item = load_item(root, id)?;
    if item.state == ItemState::Claimed {
        return Err(CoreError::ClaimConflict(id.to_string()));
    }
    item.transition(ItemState::Claimed)?;
    save_item(root, &item)?;
    info!(item = %id, "claimed");
    Ok(item)
}

/// Record the consumer's verdict on a claimed item.
///
/// Success finishes the item. Failure books the attempt and either
/// requeues the item for another run or, once the retry budget is spent,
/// parks it in terminal `error`. A verdict against an item that already
/// reached a terminal state is an invariant violation: it is refused
/// loudly and nothing is written.
pub fn report(root: &Path, cfg: &Config, id: &ItemId, outcome: Outcome) -> Result<ActionItem> {
    let lock = item_lock(id);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let mut item = load_item(root, id)?;
    if item.is_terminal(cfg.queue.max_attempts) {
        error!(
            item = %id,
            state = %item.state,
            "refusing verdict against terminal item; a second worker finished it first"
        );
        return Err(CoreError::TerminalConflict {
            item: id.to_string(),
            state: item.state.to_string(),
            reason: "item already reached a terminal state".to_string(),
        });
    }
    if item.state != ItemState::Claimed {
        return Err(CoreError::InvalidTransition {
            from: item.state.to_string(),
            to: ItemState::Done.to_string(),
            reason: "verdicts apply to claimed items only".to_string(),
        });
    }

    match outcome {
        Outcome::Success => {
            item.last_error = None;
            item.transition(ItemState::Done)?;
            save_item(root, &item)?;
            info!(item = %id, attempts = item.attempt_count, "done");
        }
        Outcome::Failure(msg) => {
            item.attempt_count += 1;
            item.last_error = Some(record::normalize_error(&msg));
            item.transition(ItemState::Error)?;
            save_item(root, &item)?;
            if item.attempt_count < cfg.queue.max_attempts {
                item.transition(ItemState::Pending)?;
                save_item(root, &item)?;
                warn!(
                    item = %id,
                    attempts = item.attempt_count,
                    max = cfg.queue.max_attempts,
                    "attempt failed, requeued"
                );
            } else {
                error!(
                    item = %id,
                    attempts = item.attempt_count,
                    "retry budget exhausted, parked in error"
                );
            }
        }
    }
    Ok(item)
}

/// Recover items stuck in non-terminal `error`: the automatic requeue
/// after a failed attempt is a second write, and a crash between the two
/// leaves the first one visible.
pub fn requeue_errored(root: &Path, cfg: &Config) -> Result<Vec<ItemId>> {
    let mut requeued = Vec::new();
    for stuck in list(root, Some(ItemState::Error))? {
        if stuck.attempt_count >= cfg.queue.max_attempts {
            continue;
        }
        let id = stuck.id();
        let lock = item_lock(&id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut item = load_item(root, &id)?;
        if item.state != ItemState::Error || item.attempt_count >= cfg.queue.max_attempts {
            continue;
        }
        item.transition(ItemState::Pending)?;
        save_item(root, &item)?;
        info!(item = %id, "requeued after interrupted failure handling");
        requeued.push(id);
    }
    Ok(requeued)
}

/// Put a finished item back into rotation. Operator-only; the attempt
/// count survives so nothing about the history is rewritten.
pub fn reopen(root: &Path, cfg: &Config, id: &ItemId) -> Result<ActionItem> {
    let lock = item_lock(id);
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    let mut item = load_item(root, id)?;
    item.reopen(cfg.queue.max_attempts)?;
    save_item(root, &item)?;
    info!(item = %id, attempts = item.attempt_count, "reopened");
    Ok(item)
}

// ---------------------------------------------------------------------------
// Crate-internal access for the approval gate
// ---------------------------------------------------------------------------

pub(crate) fn load_for_update(root: &Path, id: &ItemId) -> Result<ActionItem> {
    load_item(root, id)
}

pub(crate) fn commit(root: &Path, item: &ActionItem) -> Result<()> {
    save_item(root, item)
}

pub(crate) fn lock_for(id: &ItemId) -> Arc<Mutex<()>> {
    item_lock(id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn event(source: &str, key: &str) -> CandidateEvent {
        CandidateEvent {
            id: ItemId::new(source, key).unwrap(),
            payload: format!("event {source}/{key}\n"),
            sensitive: false,
        }
    }

    fn id(source: &str, key: &str) -> ItemId {
        ItemId::new(source, key).unwrap()
    }

    fn submit_one(root: &Path, cfg: &Config, source: &str, key: &str) -> ActionItem {
        match submit(root, cfg, event(source, key)).unwrap() {
            Submission::Created(item) => item,
            Submission::Duplicate => panic!("expected creation for {source}:{key}"),
        }
    }

    #[test]
    fn submit_creates_pending_item() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        assert_eq!(item.state, ItemState::Pending);
        assert_eq!(item.attempt_count, 0);
        assert!(paths::item_path(dir.path(), "inbox", "file-42").exists());
    }

    #[test]
    fn duplicate_submission_discarded() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        submit_one(dir.path(), &cfg, "inbox", "file-42");
        let second = submit(dir.path(), &cfg, event("inbox", "file-42")).unwrap();
        assert!(matches!(second, Submission::Duplicate));
        assert_eq!(list(dir.path(), None).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_after_done_discarded() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        claim(dir.path(), &item.id()).unwrap();
        report(dir.path(), &cfg, &item.id(), Outcome::Success).unwrap();

        let again = submit(dir.path(), &cfg, event("inbox", "file-42")).unwrap();
        assert!(matches!(again, Submission::Duplicate));
        let reloaded = get(dir.path(), &item.id()).unwrap();
        assert_eq!(reloaded.state, ItemState::Done);
    }

    #[test]
    fn submission_heals_missing_dedup_entry() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        submit_one(dir.path(), &cfg, "inbox", "file-42");
        // Crash window: record exists but the log entry never landed.
        std::fs::remove_file(paths::dedup_log_path(dir.path(), "inbox")).unwrap();

        let again = submit(dir.path(), &cfg, event("inbox", "file-42")).unwrap();
        assert!(matches!(again, Submission::Duplicate));
        assert!(dedup::seen(dir.path(), "inbox", "file-42").unwrap());
    }

    #[test]
    fn sensitive_submission_enters_gate() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let mut ev = event("gmail", "msg-7");
        ev.sensitive = true;
        let Submission::Created(item) = submit(dir.path(), &cfg, ev).unwrap() else {
            panic!("expected creation");
        };
        assert_eq!(item.state, ItemState::AwaitingApproval);
        let deadline = item.approval_deadline.expect("deadline set");
        assert_eq!(deadline, item.created_at + cfg.approval.soft_deadline());
    }

    #[test]
    fn claim_pending_succeeds_once() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        claim(dir.path(), &item.id()).unwrap();
        let err = claim(dir.path(), &item.id()).unwrap_err();
        assert!(matches!(err, CoreError::ClaimConflict(_)));
        assert_eq!(
            get(dir.path(), &item.id()).unwrap().state,
            ItemState::Claimed
        );
    }

    #[test]
    fn claim_awaiting_approval_refused() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let mut ev = event("gmail", "msg-7");
        ev.sensitive = true;
        submit(dir.path(), &cfg, ev).unwrap();
        let err = claim(dir.path(), &id("gmail", "msg-7")).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn claim_missing_item_not_found() {
        let dir = TempDir::new().unwrap();
        let err = claim(dir.path(), &id("inbox", "ghost")).unwrap_err();
        assert!(matches!(err, CoreError::ItemNotFound(_)));
    }

    #[test]
    fn exactly_one_claimer_wins() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        let root = dir.path().to_path_buf();
        let item_id = item.id();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let root = root.clone();
            let item_id = item_id.clone();
            handles.push(std::thread::spawn(move || claim(&root, &item_id).is_ok()));
        }
        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
        assert_eq!(
            get(dir.path(), &item_id).unwrap().state,
            ItemState::Claimed
        );
    }

    #[test]
    fn report_success_finishes_item() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        claim(dir.path(), &item.id()).unwrap();
        let done = report(dir.path(), &cfg, &item.id(), Outcome::Success).unwrap();
        assert_eq!(done.state, ItemState::Done);
        assert!(done.last_error.is_none());
    }

    #[test]
    fn report_failure_requeues_below_ceiling() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        claim(dir.path(), &item.id()).unwrap();
        let failed = report(
            dir.path(),
            &cfg,
            &item.id(),
            Outcome::Failure("consumer timed out\nafter 30s".to_string()),
        )
        .unwrap();
        assert_eq!(failed.state, ItemState::Pending);
        assert_eq!(failed.attempt_count, 1);
        assert_eq!(
            failed.last_error.as_deref(),
            Some("consumer timed out; after 30s")
        );
    }

    #[test]
    fn report_failure_terminal_at_ceiling() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        let item_id = item.id();

        for attempt in 1..=cfg.queue.max_attempts {
            claim(dir.path(), &item_id).unwrap();
            let failed = report(
                dir.path(),
                &cfg,
                &item_id,
                Outcome::Failure(format!("boom {attempt}")),
            )
            .unwrap();
            assert_eq!(failed.attempt_count, attempt);
            if attempt < cfg.queue.max_attempts {
                assert_eq!(failed.state, ItemState::Pending);
            } else {
                assert_eq!(failed.state, ItemState::Error);
            }
        }

        // Spent budget: the item is out of rotation for good.
        let err = claim(dir.path(), &item_id).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn report_on_terminal_item_refused_loudly() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        claim(dir.path(), &item.id()).unwrap();
        report(dir.path(), &cfg, &item.id(), Outcome::Success).unwrap();

        let err = report(dir.path(), &cfg, &item.id(), Outcome::Success).unwrap_err();
        assert!(matches!(err, CoreError::TerminalConflict { .. }));
        let err = report(
            dir.path(),
            &cfg,
            &item.id(),
            Outcome::Failure("late".to_string()),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::TerminalConflict { .. }));
        // And nothing was written.
        assert_eq!(get(dir.path(), &item.id()).unwrap().state, ItemState::Done);
    }

    #[test]
    fn report_unclaimed_item_invalid() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        let err = report(dir.path(), &cfg, &item.id(), Outcome::Success).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn reopen_done_item() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        claim(dir.path(), &item.id()).unwrap();
        report(dir.path(), &cfg, &item.id(), Outcome::Success).unwrap();

        let reopened = reopen(dir.path(), &cfg, &item.id()).unwrap();
        assert_eq!(reopened.state, ItemState::Pending);
        claim(dir.path(), &item.id()).unwrap();
    }

    #[test]
    fn reopen_pending_item_refused() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        assert!(reopen(dir.path(), &cfg, &item.id()).is_err());
    }

    #[test]
    fn requeue_sweep_recovers_interrupted_failure() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");

        // Simulate a crash after the error commit but before the requeue.
        let mut stuck = get(dir.path(), &item.id()).unwrap();
        stuck.state = ItemState::Error;
        stuck.attempt_count = 1;
        stuck.last_error = Some("boom".to_string());
        save_item(dir.path(), &stuck).unwrap();

        let requeued = requeue_errored(dir.path(), &cfg).unwrap();
        assert_eq!(requeued, vec![item.id()]);
        assert_eq!(
            get(dir.path(), &item.id()).unwrap().state,
            ItemState::Pending
        );
    }

    #[test]
    fn requeue_sweep_leaves_terminal_errors() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");

        let mut parked = get(dir.path(), &item.id()).unwrap();
        parked.state = ItemState::Error;
        parked.attempt_count = cfg.queue.max_attempts;
        save_item(dir.path(), &parked).unwrap();

        assert!(requeue_errored(dir.path(), &cfg).unwrap().is_empty());
        assert_eq!(get(dir.path(), &item.id()).unwrap().state, ItemState::Error);
    }

    #[test]
    fn malformed_record_is_quarantined_not_fatal() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        submit_one(dir.path(), &cfg, "inbox", "file-1");
        let bad = paths::item_path(dir.path(), "inbox", "file-2");
        std::fs::create_dir_all(bad.parent().unwrap()).unwrap();
        std::fs::write(&bad, "not a record at all").unwrap();

        let items = list(dir.path(), None).unwrap();
        assert_eq!(items.len(), 1);
        assert!(!bad.exists());
        assert!(paths::quarantine_source_dir(dir.path(), "inbox")
            .join("file-2.item")
            .exists());

        let counts = counts(dir.path()).unwrap();
        assert_eq!(counts.quarantined, 1);
        assert_eq!(counts.total, 1);
    }

    #[test]
    fn identity_mismatch_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let item = submit_one(dir.path(), &cfg, "inbox", "file-42");
        // Copy the record under a name that contradicts its header.
        let data = record::render_record(&item).unwrap();
        std::fs::write(paths::item_path(dir.path(), "inbox", "impostor"), data).unwrap();

        let items = list(dir.path(), None).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(quarantined(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn list_filters_by_state() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        submit_one(dir.path(), &cfg, "inbox", "file-1");
        let second = submit_one(dir.path(), &cfg, "inbox", "file-2");
        claim(dir.path(), &second.id()).unwrap();

        let pending = list(dir.path(), Some(ItemState::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].dedup_key, "file-1");
        let claimed = list(dir.path(), Some(ItemState::Claimed)).unwrap();
        assert_eq!(claimed.len(), 1);
    }

    #[test]
    fn inbox_walkthrough() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let ev = CandidateEvent {
            id: id("inbox", "file-42"),
            payload: "new file: /shared/inbox/report.pdf\n".to_string(),
            sensitive: false,
        };

        let Submission::Created(item) = submit(dir.path(), &cfg, ev.clone()).unwrap() else {
            panic!("expected creation");
        };
        assert_eq!(item.state, ItemState::Pending);

        // The watcher fires again before anyone gets to the file.
        assert!(matches!(
            submit(dir.path(), &cfg, ev.clone()).unwrap(),
            Submission::Duplicate
        ));

        let claimed = claim(dir.path(), &item.id()).unwrap();
        assert_eq!(claimed.state, ItemState::Claimed);
        let done = report(dir.path(), &cfg, &item.id(), Outcome::Success).unwrap();
        assert_eq!(done.state, ItemState::Done);

        // Still a duplicate after completion.
        assert!(matches!(
            submit(dir.path(), &cfg, ev).unwrap(),
            Submission::Duplicate
        ));
        assert_eq!(list(dir.path(), None).unwrap().len(), 1);
    }
}
