//! Error types for the idempotency gate

use thiserror::Error;

/// Result type for idempotency operations
pub type IdempotencyResult<T> = Result<T, IdempotencyError>;

/// Errors raised by the gate or its record store
#[derive(Error, Debug)]
pub enum IdempotencyError {
    /// Key validation failed (empty, too long, non-visible characters)
    #[error("Invalid idempotency key: {0}")]
    InvalidKey(String),

    /// The key was already used by this requester for a different request
    #[error("Idempotency key was already used for a different request")]
    KeyReused,

    /// Another request holding the same key has not finished yet
    #[error("A request with this idempotency key is still in progress")]
    InProgress,

    /// Record store could not be reached (timeouts, connection loss)
    #[error("Idempotency store unavailable: {0}")]
    StoreUnavailable(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored response could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The spawned operation task panicked or was aborted
    #[error("Operation task failed: {0}")]
    TaskFailed(String),
}

impl IdempotencyError {
    /// Check if error means the record store cannot be trusted right now.
    ///
    /// The gate fails closed on these: the request is rejected instead of
    /// being executed without deduplication.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            IdempotencyError::StoreUnavailable(_)
                | IdempotencyError::Database(_)
                | IdempotencyError::Json(_)
        )
    }

    /// Check if error is transient (client may retry with the same key)
    pub fn is_transient(&self) -> bool {
        match self {
            IdempotencyError::InProgress | IdempotencyError::StoreUnavailable(_) => true,
            IdempotencyError::Database(sqlx_err) => matches!(
                sqlx_err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

/// Failure of [`crate::IdempotencyGate::execute`]: either the gate itself
/// refused the request, or the wrapped operation failed.
#[derive(Debug)]
pub enum GateError<E> {
    Idempotency(IdempotencyError),
    Operation(E),
}

impl<E> From<IdempotencyError> for GateError<E> {
    fn from(err: IdempotencyError) -> Self {
        GateError::Idempotency(err)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for GateError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::Idempotency(err) => write!(f, "{}", err),
            GateError::Operation(err) => write!(f, "Operation failed: {}", err),
        }
    }
}
