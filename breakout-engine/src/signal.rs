//! Signal detection.
//!
//! A pure function of the candle, the volume baseline that preceded it, the
//! strategy parameters and the open position (if any). Entry is only
//! considered without a position; add-on and exit only with one. Exit wins
//! when both conditions hold on the same candle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use breakout_domain::trailing::{drawdown_pct, is_trailing_stop_hit, rise_pct};
use breakout_domain::{
    Candle, DomainError, ExitReason, OrderSizeLimits, Position, Price, Quantity, StrategyParameters,
};

// =============================================================================
// Sizing
// =============================================================================

/// Order size requested by a signal, resolved against capital at submit time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuantityIntent {
    /// Price the quantity is computed at (the candle close)
    pub reference_price: Price,
    /// Q, percent of total capital to commit
    pub capital_fraction_pct: Decimal,
    pub limits: Option<OrderSizeLimits>,
}

/// Concrete order size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderSize {
    pub quantity: Quantity,
    /// `quantity × reference_price`
    pub notional: Decimal,
}

impl QuantityIntent {
    pub fn new(reference_price: Price, params: &StrategyParameters) -> Self {
        Self {
            reference_price,
            capital_fraction_pct: params.capital_fraction_pct(),
            limits: params.order_size_limits(),
        }
    }

    /// Size the order for `total_capital`.
    ///
    /// The quantity is truncated to [`Quantity::SCALE`] places, then clamped
    /// to the order size limits. Clamping up to the minimum can push the
    /// notional past Q%, in which case the risk gate refuses it.
    ///
    /// # Errors
    /// `DomainError::PositionSizingError` when the capital buys nothing,
    /// `DomainError::Overflow` when the size is not representable.
    pub fn resolve(&self, total_capital: Decimal) -> Result<OrderSize, DomainError> {
        let raw = total_capital
            .checked_mul(self.capital_fraction_pct)
            .map(|scaled| scaled / Decimal::ONE_HUNDRED)
            .and_then(|budget| budget.checked_div(self.reference_price.as_decimal()))
            .ok_or_else(|| {
                DomainError::Overflow(format!(
                    "sizing {}% of {} at {}",
                    self.capital_fraction_pct, total_capital, self.reference_price
                ))
            })?;

        let quantity = match (Quantity::truncated(raw), self.limits) {
            (Ok(quantity), Some(limits)) => limits.clamp(quantity),
            (Ok(quantity), None) => quantity,
            (Err(_), Some(limits)) => limits.min(),
            (Err(_), None) => {
                return Err(DomainError::PositionSizingError(format!(
                    "capital {} at {}% buys nothing at {}",
                    total_capital, self.capital_fraction_pct, self.reference_price
                )))
            },
        };

        Ok(OrderSize {
            quantity,
            notional: Position::fill_cost(self.reference_price, quantity)?,
        })
    }
}

// =============================================================================
// Signal
// =============================================================================

/// Outcome of evaluating one candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "detail", rename_all = "snake_case")]
pub enum Signal {
    NoSignal,
    Enter(QuantityIntent),
    Add(QuantityIntent),
    Exit(ExitReason),
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Signal::NoSignal)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Signal::NoSignal => "none",
            Signal::Enter(_) => "enter",
            Signal::Add(_) => "add",
            Signal::Exit(_) => "exit",
        }
    }
}

/// Stateless breakout detector.
pub struct SignalDetector;

impl SignalDetector {
    /// Evaluate one candle.
    ///
    /// `baseline_average` is the mean volume of the window *before* this
    /// candle; `None` while the baseline is still filling.
    pub fn evaluate(
        candle: &Candle,
        baseline_average: Option<Decimal>,
        params: &StrategyParameters,
        position: Option<&Position>,
    ) -> Signal {
        let Ok(close) = Price::new(candle.close) else {
            return Signal::NoSignal;
        };

        let signal = match position {
            None => Self::entry(candle, close, baseline_average, params),
            Some(position) => Self::exit(position, close, params)
                .or_else(|| Self::add_on(position, close, params))
                .unwrap_or(Signal::NoSignal),
        };

        if signal.is_actionable() {
            debug!(
                symbol = %candle.symbol,
                signal = signal.kind(),
                close = %candle.close,
                volume = %candle.volume,
                "Signal detected"
            );
        }
        signal
    }

    fn entry(
        candle: &Candle,
        close: Price,
        baseline_average: Option<Decimal>,
        params: &StrategyParameters,
    ) -> Signal {
        let Some(average) = baseline_average.filter(|avg| *avg > Decimal::ZERO) else {
            return Signal::NoSignal;
        };
        let Some(change_pct) = candle.price_change_pct() else {
            return Signal::NoSignal;
        };

        // A threshold past the representable range cannot be reached
        let volume_breakout = params
            .volume_multiplier()
            .checked_mul(average)
            .is_some_and(|threshold| candle.volume >= threshold);
        let price_breakout = change_pct >= params.price_change_pct();

        if volume_breakout && price_breakout {
            Signal::Enter(QuantityIntent::new(close, params))
        } else {
            Signal::NoSignal
        }
    }

    fn exit(position: &Position, close: Price, params: &StrategyParameters) -> Option<Signal> {
        let peak = position.highest_price.max(close);
        if !is_trailing_stop_hit(peak, close, params.trailing_stop_pct()) {
            return None;
        }
        Some(Signal::Exit(ExitReason::TrailingStop {
            peak,
            drawdown_pct: drawdown_pct(peak, close)?,
        }))
    }

    fn add_on(position: &Position, close: Price, params: &StrategyParameters) -> Option<Signal> {
        if rise_pct(position.add_on_reference, close)? >= params.add_on_pct() {
            Some(Signal::Add(QuantityIntent::new(close, params)))
        } else {
            None
        }
    }
}
