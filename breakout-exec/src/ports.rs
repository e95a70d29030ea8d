//! Execution layer port definitions.
//!
//! Ports define the interfaces for external services. Adapters implement
//! them for a specific exchange (or the in-memory stub).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use breakout_domain::{CapitalSnapshot, Fill, OrderSide, Price, Quantity, Symbol};

use crate::error::ExecError;

// =============================================================================
// Orders
// =============================================================================

/// Why an order is being placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Entry,
    AddOn,
    Exit,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Entry => write!(f, "entry"),
            OrderKind::AddOn => write!(f, "add_on"),
            OrderKind::Exit => write!(f, "exit"),
        }
    }
}

/// A market order the strategy wants executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Client order id, also the intent journal key
    pub client_order_id: Uuid,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Quantity,
    /// Candle close the order was sized at
    pub reference_price: Price,
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    fn new(symbol: Symbol, side: OrderSide, kind: OrderKind, quantity: Quantity, reference_price: Price) -> Self {
        Self {
            client_order_id: Uuid::now_v7(),
            symbol,
            side,
            kind,
            quantity,
            reference_price,
            created_at: Utc::now(),
        }
    }

    /// Buy order opening a new position.
    pub fn entry(symbol: Symbol, quantity: Quantity, reference_price: Price) -> Self {
        Self::new(symbol, OrderSide::Buy, OrderKind::Entry, quantity, reference_price)
    }

    /// Buy order growing an open position.
    pub fn add_on(symbol: Symbol, quantity: Quantity, reference_price: Price) -> Self {
        Self::new(symbol, OrderSide::Buy, OrderKind::AddOn, quantity, reference_price)
    }

    /// Sell order closing an open position.
    pub fn exit(symbol: Symbol, quantity: Quantity, reference_price: Price) -> Self {
        Self::new(symbol, OrderSide::Sell, OrderKind::Exit, quantity, reference_price)
    }

    pub fn notional(&self) -> Decimal {
        self.quantity.as_decimal().saturating_mul(self.reference_price.as_decimal())
    }
}

/// Exchange outcome for an [`OrderIntent`].
///
/// `filled_quantity` may be below the requested quantity (partial fill) or
/// zero (nothing filled).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillResult {
    pub client_order_id: Uuid,
    pub symbol: Symbol,
    pub success: bool,
    pub filled_price: Decimal,
    pub filled_quantity: Decimal,
    /// Rejection or failure reason
    pub message: Option<String>,
    pub filled_at: DateTime<Utc>,
}

impl FillResult {
    /// Successful fill of `quantity` at `price`.
    pub fn filled(intent: &OrderIntent, price: Price, quantity: Decimal) -> Self {
        Self {
            client_order_id: intent.client_order_id,
            symbol: intent.symbol.clone(),
            success: true,
            filled_price: price.as_decimal(),
            filled_quantity: quantity,
            message: None,
            filled_at: Utc::now(),
        }
    }

    /// Failed or rejected order.
    pub fn failed(intent: &OrderIntent, message: impl Into<String>) -> Self {
        Self {
            client_order_id: intent.client_order_id,
            symbol: intent.symbol.clone(),
            success: false,
            filled_price: Decimal::ZERO,
            filled_quantity: Decimal::ZERO,
            message: Some(message.into()),
            filled_at: Utc::now(),
        }
    }

    /// The confirmed fill, if anything was actually filled.
    pub fn as_fill(&self) -> Option<Fill> {
        if !self.success {
            return None;
        }
        let price = Price::new(self.filled_price).ok()?;
        let quantity = Quantity::new(self.filled_quantity).ok()?;
        Some(Fill::new(price, quantity, self.filled_at))
    }

    /// Whether less than `requested` was filled.
    pub fn is_partial(&self, requested: Quantity) -> bool {
        self.success && self.filled_quantity < requested.as_decimal()
    }
}

// =============================================================================
// Exchange Port
// =============================================================================

/// Port for exchange operations.
///
/// Implementations:
/// - `StubExchange` - immediate fills at a configured or reference price
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Submit a market order and wait for its outcome.
    ///
    /// A rejected order is `Ok` with `success == false`; `Err` means the
    /// exchange could not be reached or answered nonsense.
    async fn submit_order(&self, intent: &OrderIntent) -> Result<FillResult, ExecError>;

    /// Current account capital.
    async fn capital_snapshot(&self) -> Result<CapitalSnapshot, ExecError>;

    /// Check if exchange is healthy/connected.
    async fn health_check(&self) -> Result<(), ExecError>;
}
