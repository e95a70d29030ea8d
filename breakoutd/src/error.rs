//! Daemon error types.

use breakout_domain::{DomainError, Symbol};
use breakout_engine::EngineError;
use breakout_exec::ExecError;
use breakout_ledger::LedgerError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Engine error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// No worker is running for the symbol
    #[error("Symbol not tracked: {0}")]
    SymbolNotTracked(Symbol),

    /// A worker is already running for the symbol
    #[error("Symbol already tracked: {0}")]
    SymbolAlreadyTracked(Symbol),

    /// Event bus error
    #[error("Event bus error: {0}")]
    EventBus(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
