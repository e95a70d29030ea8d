//! Engine errors

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use breakout_domain::{DomainError, Symbol};

use crate::risk::RiskRejection;

/// Errors produced by the decision layer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Baseline does not yet hold a full window
    #[error("Insufficient data: {have} of {need} candles in volume baseline")]
    InsufficientData { have: usize, need: usize },

    /// Candle timestamp is not after the last admitted one
    #[error("Stale or out-of-order candle for {symbol}: {received} is not after {last}")]
    StaleOrOutOfOrderCandle {
        symbol: Symbol,
        last: DateTime<Utc>,
        received: DateTime<Utc>,
    },

    /// Admitting the candle's volume would overflow the running sum
    #[error("Volume {volume} for {symbol} overflows the baseline sum")]
    VolumeOverflow { symbol: Symbol, volume: Decimal },

    /// Risk controller refused the order
    #[error("Risk rejected: {0}")]
    RiskRejected(#[from] RiskRejection),

    /// Domain validation failed while sizing an order
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
