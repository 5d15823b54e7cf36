//! Error types for audit-tracker.

use thiserror::Error;

use crate::model::{Action, Status, TaskId, UserId};

#[derive(Debug, Error)]
pub enum Error {
    /// Caller-fixable input problem (missing observation status, blank name, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition on task {task_id}: {actor} cannot {action} from {from}")]
    InvalidTransition {
        task_id: TaskId,
        from: Status,
        action: Action,
        actor: UserId,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// The stored task moved on since the snapshot was read. Refetch and reapply.
    #[error("task {task_id} was modified concurrently (expected version {expected})")]
    ConcurrentModification { task_id: TaskId, expected: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Only a concurrent modification can succeed when retried with a fresh snapshot.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrentModification { .. })
    }

    /// Short machine-readable label, used as a metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::NotFound(_) => "not_found",
            Error::ConcurrentModification { .. } => "concurrent_modification",
            Error::Database(_) | Error::Migrate(_) => "database",
            Error::Io(_) => "io",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
