//! Execution layer error types.

use thiserror::Error;

/// Errors that can occur during execution operations.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Exchange communication error
    #[error("Exchange error: {0}")]
    Exchange(String),

    /// Order was rejected by exchange
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Intent journal error
    #[error("Intent journal error: {0}")]
    IntentJournal(String),

    /// Intent already processed (idempotency check)
    #[error("Intent already processed: {0}")]
    AlreadyProcessed(uuid::Uuid),

    /// Candle feed error
    #[error("Feed error: {0}")]
    Feed(String),

    /// Candle feed has shut down for good
    #[error("Feed closed: {0}")]
    FeedClosed(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] breakout_domain::DomainError),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
