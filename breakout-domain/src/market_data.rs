//! Market Data Types
//!
//! Exchange-agnostic candle type consumed by the volume baseline and the
//! signal detector. One candle is one per-minute OHLCV aggregation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Symbol;

// =============================================================================
// Candle
// =============================================================================

/// OHLCV candlestick data.
///
/// Candles for a symbol are expected with strictly increasing timestamps;
/// the baseline rejects anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Trading symbol
    pub symbol: Symbol,
    /// Candle open time
    pub timestamp: DateTime<Utc>,
    /// Open price
    pub open: Decimal,
    /// High price
    pub high: Decimal,
    /// Low price
    pub low: Decimal,
    /// Close price
    pub close: Decimal,
    /// Total volume traded
    pub volume: Decimal,
}

impl Candle {
    /// Create a new candle.
    pub fn new(
        symbol: Symbol,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            symbol,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Percent change from open to close: `(close - open) / open × 100`.
    ///
    /// Returns `None` when `open` is not positive or the change is not
    /// representable.
    pub fn price_change_pct(&self) -> Option<Decimal> {
        if self.open <= Decimal::ZERO {
            return None;
        }
        self.close
            .checked_sub(self.open)?
            .checked_div(self.open)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }

    /// Whether the candle closed above where it opened.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, close: Decimal) -> Candle {
        Candle::new(
            Symbol::from_pair("BTCUSDT").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            open,
            open.max(close),
            open.min(close),
            close,
            dec!(10),
        )
    }

    #[test]
    fn test_price_change_pct() {
        assert_eq!(candle(dec!(100), dec!(102)).price_change_pct(), Some(dec!(2)));
        assert_eq!(candle(dec!(100), dec!(99)).price_change_pct(), Some(dec!(-1)));
    }

    #[test]
    fn test_price_change_pct_zero_open() {
        assert_eq!(candle(dec!(0), dec!(5)).price_change_pct(), None);
    }

    #[test]
    fn test_price_change_pct_out_of_range() {
        assert_eq!(candle(dec!(0.001), Decimal::MAX / dec!(2)).price_change_pct(), None);
        assert_eq!(candle(dec!(1), Decimal::MAX).price_change_pct(), None);
    }

    #[test]
    fn test_is_bullish() {
        assert!(candle(dec!(100), dec!(101)).is_bullish());
        assert!(!candle(dec!(100), dec!(100)).is_bullish());
    }
}
