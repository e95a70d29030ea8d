//! Strategy parameters.
//!
//! Fixed for the lifetime of a strategy run. Every range is checked once at
//! construction so the engine never has to re-validate.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value_objects::{DomainError, Quantity};

/// Lower/upper bound applied to every computed order quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSizeLimits {
    min: Quantity,
    max: Quantity,
}

impl OrderSizeLimits {
    /// Create limits, requiring `min <= max`.
    pub fn new(min: Decimal, max: Decimal) -> Result<Self, DomainError> {
        let min = Quantity::new(min)
            .map_err(|_| DomainError::InvalidParameter("min order size must be positive".into()))?;
        let max = Quantity::new(max)
            .map_err(|_| DomainError::InvalidParameter("max order size must be positive".into()))?;
        if min > max {
            return Err(DomainError::InvalidParameter(format!(
                "min order size {} exceeds max order size {}",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    /// Smallest order quantity.
    pub fn min(&self) -> Quantity {
        self.min
    }

    /// Largest order quantity.
    pub fn max(&self) -> Quantity {
        self.max
    }

    /// Clamp a quantity into `[min, max]`.
    pub fn clamp(&self, quantity: Quantity) -> Quantity {
        quantity.max(self.min).min(self.max)
    }
}

/// Parameters of the volume+price breakout strategy.
///
/// | field | meaning | allowed |
/// |---|---|---|
/// | `volume_window` | R, candles in the volume baseline | 1..=200 |
/// | `volume_multiplier` | N, volume must reach N × average | (0, 10] |
/// | `price_change_pct` | M, open→close change in percent | [0, 50] |
/// | `capital_fraction_pct` | Q, percent of capital per order | (0, 100] |
/// | `add_on_pct` | U, rise that triggers an add-on | > 0 |
/// | `trailing_stop_pct` | S, drawdown from peak that exits | (0, 100) |
/// | `max_positions` | concurrent open positions | 1..=20 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyParameters {
    volume_window: usize,
    volume_multiplier: Decimal,
    price_change_pct: Decimal,
    capital_fraction_pct: Decimal,
    add_on_pct: Decimal,
    trailing_stop_pct: Decimal,
    max_positions: usize,
    order_size_limits: Option<OrderSizeLimits>,
}

impl StrategyParameters {
    /// Create validated parameters without order size limits.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidParameter` naming the first value out of range.
    pub fn new(
        volume_window: usize,
        volume_multiplier: Decimal,
        price_change_pct: Decimal,
        capital_fraction_pct: Decimal,
        add_on_pct: Decimal,
        trailing_stop_pct: Decimal,
        max_positions: usize,
    ) -> Result<Self, DomainError> {
        if !(1..=200).contains(&volume_window) {
            return Err(DomainError::InvalidParameter(format!(
                "volume window must be between 1 and 200, got {}",
                volume_window
            )));
        }
        if volume_multiplier <= Decimal::ZERO || volume_multiplier > dec!(10) {
            return Err(DomainError::InvalidParameter(format!(
                "volume multiplier must be in (0, 10], got {}",
                volume_multiplier
            )));
        }
        if price_change_pct < Decimal::ZERO || price_change_pct > dec!(50) {
            return Err(DomainError::InvalidParameter(format!(
                "price change threshold must be in [0, 50], got {}",
                price_change_pct
            )));
        }
        if capital_fraction_pct <= Decimal::ZERO || capital_fraction_pct > Decimal::ONE_HUNDRED {
            return Err(DomainError::InvalidParameter(format!(
                "capital fraction must be in (0, 100], got {}",
                capital_fraction_pct
            )));
        }
        if add_on_pct <= Decimal::ZERO {
            return Err(DomainError::InvalidParameter(format!(
                "add-on threshold must be positive, got {}",
                add_on_pct
            )));
        }
        if trailing_stop_pct <= Decimal::ZERO || trailing_stop_pct >= Decimal::ONE_HUNDRED {
            return Err(DomainError::InvalidParameter(format!(
                "trailing stop must be in (0, 100), got {}",
                trailing_stop_pct
            )));
        }
        if !(1..=20).contains(&max_positions) {
            return Err(DomainError::InvalidParameter(format!(
                "max positions must be between 1 and 20, got {}",
                max_positions
            )));
        }

        Ok(Self {
            volume_window,
            volume_multiplier,
            price_change_pct,
            capital_fraction_pct,
            add_on_pct,
            trailing_stop_pct,
            max_positions,
            order_size_limits: None,
        })
    }

    /// Attach order size limits.
    pub fn with_order_size_limits(mut self, limits: OrderSizeLimits) -> Self {
        self.order_size_limits = Some(limits);
        self
    }

    /// R
    pub fn volume_window(&self) -> usize {
        self.volume_window
    }

    /// N
    pub fn volume_multiplier(&self) -> Decimal {
        self.volume_multiplier
    }

    /// M
    pub fn price_change_pct(&self) -> Decimal {
        self.price_change_pct
    }

    /// Q
    pub fn capital_fraction_pct(&self) -> Decimal {
        self.capital_fraction_pct
    }

    /// U
    pub fn add_on_pct(&self) -> Decimal {
        self.add_on_pct
    }

    /// S
    pub fn trailing_stop_pct(&self) -> Decimal {
        self.trailing_stop_pct
    }

    /// Maximum concurrent open positions.
    pub fn max_positions(&self) -> usize {
        self.max_positions
    }

    /// Optional order size limits.
    pub fn order_size_limits(&self) -> Option<OrderSizeLimits> {
        self.order_size_limits
    }

    /// Largest notional a single order may carry: Q% of `total_capital`.
    pub fn max_order_notional(&self, total_capital: Decimal) -> Decimal {
        (total_capital / Decimal::ONE_HUNDRED).saturating_mul(self.capital_fraction_pct)
    }
}

impl Default for StrategyParameters {
    fn default() -> Self {
        Self {
            volume_window: 30,
            volume_multiplier: dec!(2.0),
            price_change_pct: dec!(1.5),
            capital_fraction_pct: dec!(10),
            add_on_pct: dec!(2.0),
            trailing_stop_pct: dec!(3.0),
            max_positions: 3,
            order_size_limits: None,
        }
    }
}

impl fmt::Display for StrategyParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R={} N={} M={}% Q={}% U={}% S={}% max_positions={}",
            self.volume_window,
            self.volume_multiplier,
            self.price_change_pct,
            self.capital_fraction_pct,
            self.add_on_pct,
            self.trailing_stop_pct,
            self.max_positions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(window: usize, n: Decimal, m: Decimal, q: Decimal) -> Result<StrategyParameters, DomainError> {
        StrategyParameters::new(window, n, m, q, dec!(2), dec!(3), 3)
    }

    #[test]
    fn test_default_parameters_are_valid() {
        let d = StrategyParameters::default();
        let rebuilt = StrategyParameters::new(
            d.volume_window(),
            d.volume_multiplier(),
            d.price_change_pct(),
            d.capital_fraction_pct(),
            d.add_on_pct(),
            d.trailing_stop_pct(),
            d.max_positions(),
        )
        .unwrap();
        assert_eq!(rebuilt, d);
    }

    #[test]
    fn test_volume_window_range() {
        assert!(params(0, dec!(2), dec!(1.5), dec!(10)).is_err());
        assert!(params(1, dec!(2), dec!(1.5), dec!(10)).is_ok());
        assert!(params(200, dec!(2), dec!(1.5), dec!(10)).is_ok());
        assert!(params(201, dec!(2), dec!(1.5), dec!(10)).is_err());
    }

    #[test]
    fn test_multiplier_and_threshold_ranges() {
        assert!(params(30, dec!(0), dec!(1.5), dec!(10)).is_err());
        assert!(params(30, dec!(10.1), dec!(1.5), dec!(10)).is_err());
        assert!(params(30, dec!(2), dec!(0), dec!(10)).is_ok());
        assert!(params(30, dec!(2), dec!(-0.1), dec!(10)).is_err());
        assert!(params(30, dec!(2), dec!(50.1), dec!(10)).is_err());
    }

    #[test]
    fn test_capital_fraction_range() {
        assert!(params(30, dec!(2), dec!(1.5), dec!(0)).is_err());
        assert!(params(30, dec!(2), dec!(1.5), dec!(100)).is_ok());
        assert!(params(30, dec!(2), dec!(1.5), dec!(100.5)).is_err());
    }

    #[test]
    fn test_trailing_stop_and_max_positions_ranges() {
        assert!(StrategyParameters::new(30, dec!(2), dec!(1.5), dec!(10), dec!(2), dec!(0), 3).is_err());
        assert!(StrategyParameters::new(30, dec!(2), dec!(1.5), dec!(10), dec!(2), dec!(100), 3).is_err());
        assert!(StrategyParameters::new(30, dec!(2), dec!(1.5), dec!(10), dec!(0), dec!(3), 3).is_err());
        assert!(StrategyParameters::new(30, dec!(2), dec!(1.5), dec!(10), dec!(2), dec!(3), 0).is_err());
        assert!(StrategyParameters::new(30, dec!(2), dec!(1.5), dec!(10), dec!(2), dec!(3), 21).is_err());
    }

    #[test]
    fn test_max_order_notional() {
        let p = StrategyParameters::default();
        assert_eq!(p.max_order_notional(dec!(10000)), dec!(1000));
    }

    #[test]
    fn test_order_size_limits_clamp() {
        let limits = OrderSizeLimits::new(dec!(0.001), dec!(1.0)).unwrap();
        assert_eq!(limits.clamp(Quantity::new(dec!(5)).unwrap()).as_decimal(), dec!(1.0));
        assert_eq!(limits.clamp(Quantity::new(dec!(0.0001)).unwrap()).as_decimal(), dec!(0.001));
        assert_eq!(limits.clamp(Quantity::new(dec!(0.5)).unwrap()).as_decimal(), dec!(0.5));
        assert!(OrderSizeLimits::new(dec!(2), dec!(1)).is_err());
    }
}
