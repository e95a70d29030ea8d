//! Capital and fill records exchanged with the exchange collaborator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::{DomainError, Price, Quantity};

/// Account capital as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalSnapshot {
    pub total_capital: Decimal,
    pub total_committed: Decimal,
}

impl CapitalSnapshot {
    pub fn new(total_capital: Decimal, total_committed: Decimal) -> Self {
        Self { total_capital, total_committed }
    }

    pub fn available(&self) -> Decimal {
        (self.total_capital - self.total_committed).max(Decimal::ZERO)
    }
}

/// A confirmed (possibly partial) fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: Price,
    pub quantity: Quantity,
    pub filled_at: DateTime<Utc>,
}

impl Fill {
    pub fn new(price: Price, quantity: Quantity, filled_at: DateTime<Utc>) -> Self {
        Self { price, quantity, filled_at }
    }

    /// `price × quantity`
    pub fn cost(&self) -> Result<Decimal, DomainError> {
        self.price
            .as_decimal()
            .checked_mul(self.quantity.as_decimal())
            .ok_or_else(|| DomainError::overflow("fill cost"))
    }
}
