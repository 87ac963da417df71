use super::types::EntityKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Snapshot source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Record '{key}' not found in {kind} snapshot")]
    RecordNotFound { kind: EntityKind, key: String },

    #[error("Snapshot record for '{key}' is a {found}, expected a {expected}")]
    KindMismatch {
        key: String,
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Storage busy: {0}")]
    StorageBusy(String),

    #[error("Reconciliation pass cancelled")]
    Cancelled,

    #[error("A reconciliation pass is already running")]
    AlreadyRunning,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Verification error: {0}")]
    Verification(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl SyncError {
    /// Whether retrying the same unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted(_) | Self::StorageBusy(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::SourceUnavailable(format!("malformed dump record: {}", err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for SyncError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Storage(format!("lock poisoned: {}", err))
    }
}
