use crate::error::{CoreError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ItemState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    Claimed,
    AwaitingApproval,
    Approved,
    Rejected,
    Done,
    Error,
}

impl ItemState {
    pub fn all() -> &'static [ItemState] {
        &[
            ItemState::Pending,
            ItemState::Claimed,
            ItemState::AwaitingApproval,
            ItemState::Approved,
            ItemState::Rejected,
            ItemState::Done,
            ItemState::Error,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Pending => "pending",
            ItemState::Claimed => "claimed",
            ItemState::AwaitingApproval => "awaiting_approval",
            ItemState::Approved => "approved",
            ItemState::Rejected => "rejected",
            ItemState::Done => "done",
            ItemState::Error => "error",
        }
    }

    /// Lifecycle graph. `error -> pending` is the automatic requeue edge;
    /// whether it may be taken also depends on the attempt ceiling, which
    /// the store enforces.
    pub fn can_transition_to(self, target: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, target),
            (Pending, Claimed)
                | (Pending, AwaitingApproval)
                | (Claimed, Done)
                | (Claimed, Error)
                | (Error, Pending)
                | (AwaitingApproval, Approved)
                | (AwaitingApproval, Rejected)
                | (Approved, Claimed)
        )
    }

    /// States with no outgoing edge regardless of retry budget.
    pub fn is_always_terminal(self) -> bool {
        matches!(self, ItemState::Done | ItemState::Rejected)
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ItemState::Pending),
            "claimed" => Ok(ItemState::Claimed),
            "awaiting_approval" => Ok(ItemState::AwaitingApproval),
            "approved" => Ok(ItemState::Approved),
            "rejected" => Ok(ItemState::Rejected),
            "done" => Ok(ItemState::Done),
            "error" => Ok(ItemState::Error),
            _ => Err(CoreError::InvalidState(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

/// An item is identified by its event source and dedup key, written
/// `source:key`. The pair is permanent: no two items ever share it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    pub source: String,
    pub key: String,
}

impl ItemId {
    pub fn new(source: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let key = key.into();
        paths::validate_slug(&source)?;
        paths::validate_slug(&key)?;
        Ok(Self { source, key })
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.key)
    }
}

impl std::str::FromStr for ItemId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (source, key) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidSlug(s.to_string()))?;
        Self::new(source, key)
    }
}

// ---------------------------------------------------------------------------
// ActionItem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub source: String,
    pub dedup_key: String,
    pub state: ItemState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated_at: Option<DateTime<Utc>>,
    pub payload: String,
}

impl ActionItem {
    pub fn new(id: ItemId, payload: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            source: id.source,
            dedup_key: id.key,
            state: ItemState::Pending,
            created_at: now,
            updated_at: now,
            attempt_count: 0,
            last_error: None,
            approval_deadline: None,
            escalated_at: None,
            payload: payload.into(),
        }
    }

    pub fn id(&self) -> ItemId {
        ItemId {
            source: self.source.clone(),
            key: self.dedup_key.clone(),
        }
    }

    /// Terminal means no further lifecycle activity: `done`, `rejected`,
    /// or `error` with the retry budget spent.
    pub fn is_terminal(&self, max_attempts: u32) -> bool {
        self.state.is_always_terminal()
            || (self.state == ItemState::Error && self.attempt_count >= max_attempts)
    }

    pub fn transition(&mut self, target: ItemState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(CoreError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
                reason: "no such lifecycle edge".to_string(),
            });
        }
        self.state = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Operator-only escape hatch from a terminal state back to `pending`.
    /// The attempt count is preserved so the history stays honest.
    pub fn reopen(&mut self, max_attempts: u32) -> Result<()> {
        if !self.is_terminal(max_attempts) {
            return Err(CoreError::InvalidTransition {
                from: self.state.to_string(),
                to: ItemState::Pending.to_string(),
                reason: "reopen applies only to terminal items".to_string(),
            });
        }
        self.state = ItemState::Pending;
        self.approval_deadline = None;
        self.escalated_at = None;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
