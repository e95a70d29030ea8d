//! Stub implementations for testing.
//!
//! Simulates an exchange without making real API calls: market orders fill
//! immediately, capital is tracked from the fills, and failures can be
//! injected one order at a time.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use breakout_domain::{CapitalSnapshot, Candle, OrderSide, Price, Symbol};

use crate::error::ExecError;
use crate::feed::CandlePoller;
use crate::ports::{ExchangePort, FillResult, OrderIntent};

#[derive(Debug, Clone, Copy, Default)]
struct Holding {
    quantity: Decimal,
    cost: Decimal,
}

// =============================================================================
// Stub Exchange
// =============================================================================

/// Stub exchange for testing.
///
/// Fills at the price set for the symbol, or at the order's reference price
/// when none is set.
pub struct StubExchange {
    total_capital: RwLock<Decimal>,
    prices: RwLock<HashMap<Symbol, Decimal>>,
    candles: RwLock<HashMap<Symbol, Candle>>,
    holdings: RwLock<HashMap<Symbol, Holding>>,
    submitted: RwLock<Vec<OrderIntent>>,
    order_counter: AtomicU64,
    /// Next order errors out (exchange unreachable)
    fail_next: AtomicBool,
    /// Next order is answered with `success == false`
    reject_next: AtomicBool,
    /// Next order fills only this fraction of its quantity
    partial_next: RwLock<Option<Decimal>>,
    fill_delay: RwLock<Option<Duration>>,
}

impl StubExchange {
    /// Create a stub exchange holding `total_capital` of quote currency.
    pub fn new(total_capital: Decimal) -> Self {
        Self {
            total_capital: RwLock::new(total_capital),
            prices: RwLock::new(HashMap::new()),
            candles: RwLock::new(HashMap::new()),
            holdings: RwLock::new(HashMap::new()),
            submitted: RwLock::new(Vec::new()),
            order_counter: AtomicU64::new(0),
            fail_next: AtomicBool::new(false),
            reject_next: AtomicBool::new(false),
            partial_next: RwLock::new(None),
            fill_delay: RwLock::new(None),
        }
    }

    /// Fill orders for `symbol` at `price` from now on.
    pub fn set_price(&self, symbol: &Symbol, price: Decimal) {
        self.prices.write().unwrap_or_else(PoisonError::into_inner).insert(symbol.clone(), price);
    }

    /// Fill orders for `symbol` at their reference price again.
    pub fn clear_price(&self, symbol: &Symbol) {
        self.prices.write().unwrap_or_else(PoisonError::into_inner).remove(symbol);
    }

    pub fn set_total_capital(&self, total_capital: Decimal) {
        *self.total_capital.write().unwrap_or_else(PoisonError::into_inner) = total_capital;
    }

    /// Publish the latest candle returned to pollers.
    pub fn set_candle(&self, candle: Candle) {
        self.candles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(candle.symbol.clone(), candle);
    }

    /// Configure the next order to fail with an exchange error.
    pub fn set_fail_next(&self, fail: bool) {
        self.fail_next.store(fail, Ordering::SeqCst);
    }

    /// Configure the next order to be rejected.
    pub fn set_reject_next(&self, reject: bool) {
        self.reject_next.store(reject, Ordering::SeqCst);
    }

    /// Configure the next order to fill only `fraction` of its quantity.
    pub fn set_partial_fill_next(&self, fraction: Decimal) {
        *self.partial_next.write().unwrap_or_else(PoisonError::into_inner) = Some(fraction);
    }

    /// Hold every order for `delay` before answering.
    pub fn set_fill_delay(&self, delay: Option<Duration>) {
        *self.fill_delay.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Orders received so far, in arrival order.
    pub fn submitted_orders(&self) -> Vec<OrderIntent> {
        self.submitted.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn order_count(&self) -> u64 {
        self.order_counter.load(Ordering::SeqCst)
    }

    fn fill_price(&self, order: &OrderIntent) -> Result<Price, ExecError> {
        let configured = self
            .prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&order.symbol)
            .copied();
        match configured {
            Some(price) => Ok(Price::new(price)?),
            None => Ok(order.reference_price),
        }
    }

    fn apply(&self, order: &OrderIntent, price: Price, quantity: Decimal) -> Result<(), String> {
        let mut holdings = self.holdings.write().unwrap_or_else(PoisonError::into_inner);
        let holding = holdings.entry(order.symbol.clone()).or_default();

        match order.side {
            OrderSide::Buy => {
                holding.quantity += quantity;
                holding.cost =
                    holding.cost.saturating_add(price.as_decimal().saturating_mul(quantity));
            },
            OrderSide::Sell => {
                if quantity > holding.quantity {
                    return Err(format!(
                        "insufficient {} holdings: {} < {}",
                        order.symbol, holding.quantity, quantity
                    ));
                }
                let remaining = holding.quantity - quantity;
                holding.cost = if remaining.is_zero() {
                    Decimal::ZERO
                } else {
                    holding.cost * remaining / holding.quantity
                };
                holding.quantity = remaining;
            },
        }

        if holding.quantity.is_zero() {
            holdings.remove(&order.symbol);
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangePort for StubExchange {
    async fn submit_order(&self, order: &OrderIntent) -> Result<FillResult, ExecError> {
        self.order_counter.fetch_add(1, Ordering::SeqCst);
        self.submitted.write().unwrap_or_else(PoisonError::into_inner).push(order.clone());

        let delay = *self.fill_delay.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ExecError::Exchange("Simulated exchange failure".to_string()));
        }
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Ok(FillResult::failed(order, "Simulated rejection"));
        }

        let price = self.fill_price(order)?;
        let fraction = self.partial_next.write().unwrap_or_else(PoisonError::into_inner).take();
        let quantity = match fraction {
            Some(fraction) => order.quantity.as_decimal().saturating_mul(fraction).round_dp(8),
            None => order.quantity.as_decimal(),
        };

        if let Err(reason) = self.apply(order, price, quantity) {
            return Ok(FillResult::failed(order, reason));
        }

        tracing::debug!(
            symbol = %order.symbol,
            side = %order.side,
            %price,
            %quantity,
            "Stub: order filled"
        );
        Ok(FillResult::filled(order, price, quantity))
    }

    async fn capital_snapshot(&self) -> Result<CapitalSnapshot, ExecError> {
        let total = *self.total_capital.read().unwrap_or_else(PoisonError::into_inner);
        let committed = self
            .holdings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .fold(Decimal::ZERO, |sum, h| sum.saturating_add(h.cost));
        Ok(CapitalSnapshot::new(total, committed))
    }

    async fn health_check(&self) -> Result<(), ExecError> {
        Ok(())
    }
}

#[async_trait]
impl CandlePoller for StubExchange {
    async fn latest_candle(&self, symbol: &Symbol) -> Result<Option<Candle>, ExecError> {
        Ok(self.candles.read().unwrap_or_else(PoisonError::into_inner).get(symbol).cloned())
    }
}

// =============================================================================
// Tests
// =============================================================================
