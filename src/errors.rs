//! Unified error type for the roster ledger.
//!
//! Every fallible operation returns [`Result`]. Callers that need to branch on the
//! failure class (retry, surface a conflict, report a missing row) use
//! [`Error::kind`] instead of matching individual variants.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Coarse failure classes surfaced to the command and query layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced roster record, post, guard or shift does not exist.
    NotFound,
    /// The request is well formed but the current state does not allow it.
    PreconditionFailed,
    /// The request lost a race or contradicts an earlier, different request.
    Conflict,
    /// The store could not be reached. Only idempotent operations may be retried.
    StoreUnavailable,
    /// Configuration, I/O or unexpected store failures.
    Internal,
}

/// Errors produced by the roster ledger.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    #[error("Guard {guard_id} already holds post {post_id} at installation '{installation}'")]
    GuardAlreadyPosted {
        guard_id: i64,
        post_id: i64,
        installation: String,
    },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Database error: {0}")]
    Database(DbErr),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] keyed by a numeric id.
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`Error::PreconditionFailed`].
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::Conflict`].
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Maps the error onto the public failure taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PreconditionFailed { .. } | Self::InvalidAmount { .. } => {
                ErrorKind::PreconditionFailed
            }
            Self::Conflict { .. } | Self::GuardAlreadyPosted { .. } => ErrorKind::Conflict,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::Database(_) | Self::Config { .. } | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether an idempotent operation that failed with this error may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::StoreUnavailable)
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return Self::Conflict { reason: detail };
        }
        match err {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => Self::StoreUnavailable {
                message: err.to_string(),
            },
            other => Self::Database(other),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
