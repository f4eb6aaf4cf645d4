use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not initialized: run 'lookout init'")]
    NotInitialized,

    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("item already claimed: {0}")]
    ClaimConflict(String),

    #[error("write to terminal item {item} in state {state}: {reason}")]
    TerminalConflict {
        item: String,
        state: String,
        reason: String,
    },

    #[error("malformed record {path}: {reason}")]
    MalformedRecord { path: String, reason: String },

    #[error("item {item} quarantined: {reason}")]
    Quarantined { item: String, reason: String },

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
