//! Domain Entities
//!
//! The open position and its closed record. A position only exists once an
//! entry order has been filled; pending orders live in the ledger as
//! reservations, not as positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::trailing::{trailing_stop_price, update_trailing_stop};
use crate::value_objects::{DomainError, OrderSide, Price, Quantity, Symbol};

/// Unique identifier for a position
pub type PositionId = Uuid;

// =============================================================================
// Position
// =============================================================================

/// An open long position built from one entry fill and zero or more add-ons.
///
/// # Invariants
/// - `highest_price` never decreases
/// - `stop_loss_price == highest_price × (1 - S/100)` after every update
/// - `entry_price` is the quantity-weighted average cost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: Symbol,
    pub side: OrderSide,

    // Cost basis
    pub entry_price: Price,
    pub quantity: Quantity,
    pub total_invested: Decimal,
    pub entry_time: DateTime<Utc>,

    // Trailing stop state
    pub highest_price: Price,
    pub stop_loss_price: Price,

    // Add-on tracking
    pub add_on_count: u32,
    /// Price the next add-on threshold is measured from
    pub add_on_reference: Price,

    // P&L
    pub last_price: Price,
    pub current_pnl: Decimal,
    /// P&L already realized by partial exit fills
    pub realized_pnl: Decimal,

    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Create a position from a filled entry order.
    ///
    /// # Errors
    /// Returns `DomainError::Overflow` if the fill cost is not representable.
    pub fn open(
        symbol: Symbol,
        fill_price: Price,
        fill_quantity: Quantity,
        trailing_stop_pct: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: Uuid::now_v7(),
            symbol,
            side: OrderSide::Buy,
            entry_price: fill_price,
            quantity: fill_quantity,
            total_invested: Self::fill_cost(fill_price, fill_quantity)?,
            entry_time: at,
            highest_price: fill_price,
            stop_loss_price: trailing_stop_price(fill_price, trailing_stop_pct),
            add_on_count: 0,
            add_on_reference: fill_price,
            last_price: fill_price,
            current_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            updated_at: at,
        })
    }

    /// Cost of a fill at `price` for `quantity`.
    pub fn fill_cost(price: Price, quantity: Quantity) -> Result<Decimal, DomainError> {
        price
            .as_decimal()
            .checked_mul(quantity.as_decimal())
            .ok_or_else(|| DomainError::overflow("fill cost"))
    }

    /// Apply a filled add-on order.
    ///
    /// Averages the entry price, grows quantity and invested capital, and
    /// moves the add-on reference to the fill price. On error the position
    /// is left untouched.
    pub fn apply_add_on(
        &mut self,
        fill_price: Price,
        fill_quantity: Quantity,
        trailing_stop_pct: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let quantity = self
            .quantity
            .as_decimal()
            .checked_add(fill_quantity.as_decimal())
            .ok_or_else(|| DomainError::overflow("add-on quantity"))?;
        let total_invested = self
            .total_invested
            .checked_add(Self::fill_cost(fill_price, fill_quantity)?)
            .ok_or_else(|| DomainError::overflow("add-on invested capital"))?;
        let entry_price = total_invested
            .checked_div(quantity)
            .ok_or_else(|| DomainError::overflow("average entry price"))?;

        let mut updated = self.clone();
        updated.total_invested = total_invested;
        updated.entry_price = Price::from_positive(entry_price);
        updated.quantity = Quantity::from_positive(quantity);
        updated.add_on_count += 1;
        updated.add_on_reference = fill_price;
        updated.mark_to_market(fill_price, trailing_stop_pct, at)?;

        *self = updated;
        Ok(())
    }

    /// Revalue the position at `price`, advancing the peak if it is a new high.
    ///
    /// Nothing changes when the P&L at `price` overflows.
    pub fn mark_to_market(
        &mut self,
        price: Price,
        trailing_stop_pct: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let pnl = self.unrealized_pnl_at(price)?;
        if let Some(update) = update_trailing_stop(price, self.highest_price, trailing_stop_pct) {
            self.highest_price = update.new_peak;
        }
        self.stop_loss_price = trailing_stop_price(self.highest_price, trailing_stop_pct);
        self.last_price = price;
        self.current_pnl = pnl;
        self.updated_at = at;
        Ok(())
    }

    /// Unrealized P&L if the whole position were valued at `price`.
    pub fn unrealized_pnl_at(&self, price: Price) -> Result<Decimal, DomainError> {
        leg_pnl(self.entry_price, price, self.quantity)
    }

    /// Current P&L as a percentage of invested capital.
    pub fn pnl_pct(&self) -> Decimal {
        if self.total_invested.is_zero() {
            return Decimal::ZERO;
        }
        self.current_pnl
            .checked_div(self.total_invested)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO)
    }

    /// Apply a partial exit fill, returning the P&L it realized.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidFill` when `quantity` is not strictly
    /// less than the open quantity; a full exit goes through [`Position::close`].
    pub fn reduce(
        &mut self,
        quantity: Quantity,
        exit_price: Price,
        at: DateTime<Utc>,
    ) -> Result<Decimal, DomainError> {
        if quantity >= self.quantity {
            return Err(DomainError::InvalidFill(format!(
                "partial exit of {} does not leave a remainder of {}",
                quantity, self.quantity
            )));
        }

        let realized = leg_pnl(self.entry_price, exit_price, quantity)?;
        let remaining = Quantity::from_positive(self.quantity.as_decimal() - quantity.as_decimal());
        let total_invested = Self::fill_cost(self.entry_price, remaining)?;
        let realized_pnl = self
            .realized_pnl
            .checked_add(realized)
            .ok_or_else(|| DomainError::overflow("realized P&L"))?;
        let current_pnl = leg_pnl(self.entry_price, exit_price, remaining)?;

        self.quantity = remaining;
        self.total_invested = total_invested;
        self.realized_pnl = realized_pnl;
        self.last_price = exit_price;
        self.current_pnl = current_pnl;
        self.updated_at = at;

        Ok(realized)
    }

    /// Close the whole position at `exit_price`.
    pub fn close(
        self,
        exit_price: Price,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> Result<ClosedPosition, DomainError> {
        let realized_pnl = self
            .unrealized_pnl_at(exit_price)?
            .checked_add(self.realized_pnl)
            .ok_or_else(|| DomainError::overflow("realized P&L"))?;
        Ok(ClosedPosition {
            exit_price,
            exit_quantity: self.quantity,
            realized_pnl,
            exit_reason: reason,
            closed_at: at,
            position: self,
        })
    }
}

/// `(exit - entry) × quantity`
fn leg_pnl(entry: Price, exit: Price, quantity: Quantity) -> Result<Decimal, DomainError> {
    exit.as_decimal()
        .checked_sub(entry.as_decimal())
        .and_then(|diff| diff.checked_mul(quantity.as_decimal()))
        .ok_or_else(|| DomainError::overflow("position P&L"))
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {} (peak {}, stop {}, add-ons {})",
            self.symbol,
            self.quantity,
            self.entry_price,
            self.highest_price,
            self.stop_loss_price,
            self.add_on_count
        )
    }
}

// =============================================================================
// ClosedPosition
// =============================================================================

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExitReason {
    /// Price fell S% or more below the highest price since entry
    TrailingStop {
        /// Highest price reached
        peak: Price,
        /// Drawdown from the peak when the exit fired
        drawdown_pct: Decimal,
    },
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TrailingStop { peak, drawdown_pct } => {
                write!(f, "trailing stop ({}% below peak {})", drawdown_pct.round_dp(4), peak)
            },
        }
    }
}

/// Final record of a closed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedPosition {
    /// Position as it was when the exit filled
    pub position: Position,
    pub exit_price: Price,
    pub exit_quantity: Quantity,
    /// Realized P&L including any earlier partial exits
    pub realized_pnl: Decimal,
    pub exit_reason: ExitReason,
    pub closed_at: DateTime<Utc>,
}
