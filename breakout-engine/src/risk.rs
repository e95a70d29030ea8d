//! Risk gate for entries and add-ons.
//!
//! Stateless: every decision is made against an [`Exposure`] snapshot that
//! the caller takes under the same lock it uses to record the order, so two
//! symbols can never both pass the gate on the same headroom.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use breakout_domain::{StrategyParameters, Symbol};

/// Why an order was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RiskRejection {
    #[error("max positions reached ({open}/{max})")]
    MaxPositions { open: usize, max: usize },

    #[error("order notional {notional} exceeds {fraction_pct}% of capital ({limit})")]
    ExceedsCapitalFraction {
        notional: Decimal,
        limit: Decimal,
        fraction_pct: Decimal,
    },

    #[error("capital fully committed ({committed} of {total})")]
    CapitalFullyCommitted { committed: Decimal, total: Decimal },

    #[error("insufficient capital: {notional} requested, {available} available")]
    InsufficientCapital { notional: Decimal, available: Decimal },

    #[error("no open position for {0}")]
    NoPosition(Symbol),

    #[error("order notional must be positive, got {0}")]
    NonPositiveNotional(Decimal),
}

/// Capital and position counts as seen at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    pub total_capital: Decimal,
    /// Invested plus reserved for orders in flight
    pub committed: Decimal,
    pub open_symbols: BTreeSet<Symbol>,
    /// Entry orders in flight, counted as positions
    pub pending_entries: usize,
}

impl Exposure {
    pub fn position_count(&self) -> usize {
        self.open_symbols.len() + self.pending_entries
    }

    pub fn available(&self) -> Decimal {
        (self.total_capital - self.committed).max(Decimal::ZERO)
    }

    pub fn has_position(&self, symbol: &Symbol) -> bool {
        self.open_symbols.contains(symbol)
    }
}

/// Approves or rejects entry and add-on orders.
#[derive(Debug, Clone, Copy)]
pub struct RiskController {
    params: StrategyParameters,
}

impl RiskController {
    pub fn new(params: StrategyParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &StrategyParameters {
        &self.params
    }

    /// Check a new position of `notional`.
    ///
    /// # Errors
    /// The first rule the order breaks.
    pub fn check_entry(&self, notional: Decimal, exposure: &Exposure) -> Result<(), RiskRejection> {
        let open = exposure.position_count();
        if open + 1 > self.params.max_positions() {
            return Err(RiskRejection::MaxPositions {
                open,
                max: self.params.max_positions(),
            });
        }
        self.check_capital(notional, exposure)
    }

    /// Check an add-on of `notional` to the open position on `symbol`.
    ///
    /// Add-ons never change the position count.
    pub fn check_add(
        &self,
        symbol: &Symbol,
        notional: Decimal,
        exposure: &Exposure,
    ) -> Result<(), RiskRejection> {
        if !exposure.has_position(symbol) {
            return Err(RiskRejection::NoPosition(symbol.clone()));
        }
        self.check_capital(notional, exposure)
    }

    pub fn approve_entry(&self, notional: Decimal, exposure: &Exposure) -> bool {
        self.check_entry(notional, exposure).is_ok()
    }

    pub fn approve_add(&self, symbol: &Symbol, notional: Decimal, exposure: &Exposure) -> bool {
        self.check_add(symbol, notional, exposure).is_ok()
    }

    fn check_capital(&self, notional: Decimal, exposure: &Exposure) -> Result<(), RiskRejection> {
        if notional <= Decimal::ZERO {
            return Err(RiskRejection::NonPositiveNotional(notional));
        }

        let limit = self.params.max_order_notional(exposure.total_capital);
        if notional > limit {
            return Err(RiskRejection::ExceedsCapitalFraction {
                notional,
                limit,
                fraction_pct: self.params.capital_fraction_pct(),
            });
        }

        if exposure.committed >= exposure.total_capital {
            return Err(RiskRejection::CapitalFullyCommitted {
                committed: exposure.committed,
                total: exposure.total_capital,
            });
        }

        let after = exposure.committed.checked_add(notional);
        if after.map_or(true, |after| after > exposure.total_capital) {
            return Err(RiskRejection::InsufficientCapital {
                notional,
                available: exposure.available(),
            });
        }

        Ok(())
    }
}
