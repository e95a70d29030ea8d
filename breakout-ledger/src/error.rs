//! Ledger errors

use rust_decimal::Decimal;
use thiserror::Error;

use breakout_domain::{DomainError, Symbol};
use breakout_engine::RiskRejection;

/// Errors that can occur while mutating the ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// A position is already open on the symbol
    #[error("Duplicate position for {0}")]
    DuplicatePosition(Symbol),

    /// No open position on the symbol
    #[error("No position for {0}")]
    NoSuchPosition(Symbol),

    /// An order is already in flight for the symbol
    #[error("Order already pending for {0}")]
    PendingOrder(Symbol),

    /// The risk gate refused the reservation
    #[error("Risk rejected: {0}")]
    RiskRejected(#[from] RiskRejection),

    /// Applying the fill would commit more than total capital
    #[error("Capital exceeded on {symbol}: {committed} committed + {cost} > {total}")]
    CapitalExceeded {
        symbol: Symbol,
        committed: Decimal,
        cost: Decimal,
        total: Decimal,
    },

    /// Applying the fill would exceed the position limit
    #[error("Max positions exceeded opening {symbol} (max {max})")]
    MaxPositionsExceeded { symbol: Symbol, max: usize },

    /// Domain error passthrough
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Lock was poisoned by a panicking writer
    #[error("Ledger lock poisoned: {0}")]
    LockPoisoned(String),
}

impl LedgerError {
    /// Whether the error means ledger state and exchange state disagree.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::DuplicatePosition(_)
                | LedgerError::NoSuchPosition(_)
                | LedgerError::CapitalExceeded { .. }
                | LedgerError::MaxPositionsExceeded { .. }
        )
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
