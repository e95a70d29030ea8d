//! Executor: submits order intents to the exchange through the journal.
//!
//! # Flow
//!
//! ```text
//! OrderIntent → Intent Journal (pending) → Exchange → Intent Journal (completed) → FillResult
//! ```
//!
//! Exchange errors never escape as `Err`: they are journaled and returned as
//! a failed [`FillResult`], so callers handle every non-fill the same way.

use std::sync::Arc;
use tracing::{info, warn};

use breakout_domain::CapitalSnapshot;

use crate::error::ExecResult;
use crate::intent::{Intent, IntentJournal, IntentResult};
use crate::ports::{ExchangePort, FillResult, OrderIntent};

/// Submits orders with an audit trail.
pub struct OrderExecutor<E: ExchangePort> {
    exchange: Arc<E>,
    journal: Arc<IntentJournal>,
}

impl<E: ExchangePort> OrderExecutor<E> {
    pub fn new(exchange: Arc<E>, journal: Arc<IntentJournal>) -> Self {
        Self { exchange, journal }
    }

    pub fn exchange(&self) -> &Arc<E> {
        &self.exchange
    }

    pub fn journal(&self) -> &Arc<IntentJournal> {
        &self.journal
    }

    /// Submit `order` and wait for its outcome.
    ///
    /// # Errors
    /// Only journal errors (including `AlreadyProcessed` for a reused client
    /// order id).
    pub async fn submit(&self, order: OrderIntent) -> ExecResult<FillResult> {
        let intent = Intent::new(order.clone());
        let intent_id = intent.id;
        self.journal.record(intent)?;

        info!(
            %intent_id,
            symbol = %order.symbol,
            side = %order.side,
            kind = %order.kind,
            quantity = %order.quantity,
            reference_price = %order.reference_price,
            "Submitting order"
        );

        let (fill, result) = match self.exchange.submit_order(&order).await {
            Ok(fill) => (fill.clone(), IntentResult::Filled(fill)),
            Err(e) => {
                warn!(%intent_id, symbol = %order.symbol, error = %e, "Order submission failed");
                (FillResult::failed(&order, e.to_string()), IntentResult::Failed(e.to_string()))
            },
        };
        self.journal.complete(intent_id, result)?;

        if fill.success {
            info!(
                %intent_id,
                symbol = %fill.symbol,
                filled_price = %fill.filled_price,
                filled_quantity = %fill.filled_quantity,
                "Order filled"
            );
        } else {
            warn!(
                %intent_id,
                symbol = %fill.symbol,
                reason = fill.message.as_deref().unwrap_or("unknown"),
                "Order not filled"
            );
        }

        Ok(fill)
    }

    /// Current account capital from the exchange.
    pub async fn capital_snapshot(&self) -> ExecResult<CapitalSnapshot> {
        self.exchange.capital_snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubExchange;
    use breakout_domain::{Price, Quantity, Symbol};
    use rust_decimal_macros::dec;

    fn executor() -> OrderExecutor<StubExchange> {
        OrderExecutor::new(
            Arc::new(StubExchange::new(dec!(10000))),
            Arc::new(IntentJournal::new()),
        )
    }

    fn entry() -> OrderIntent {
        OrderIntent::entry(
            Symbol::from_pair("BTCUSDT").unwrap(),
            Quantity::new(dec!(1)).unwrap(),
            Price::new(dec!(100)).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_submit_records_fill() {
        let executor = executor();
        let order = entry();
        let id = order.client_order_id;

        let fill = executor.submit(order).await.unwrap();
        assert!(fill.success);
        assert_eq!(fill.filled_price, dec!(100));

        let intent = executor.journal().get(id).unwrap().unwrap();
        assert!(intent.is_success());
    }

    #[tokio::test]
    async fn test_exchange_error_becomes_failed_fill() {
        let executor = executor();
        executor.exchange().set_fail_next(true);
        let order = entry();
        let id = order.client_order_id;

        let fill = executor.submit(order).await.unwrap();
        assert!(!fill.success);
        assert!(fill.as_fill().is_none());

        let intent = executor.journal().get(id).unwrap().unwrap();
        assert!(matches!(intent.result, Some(IntentResult::Failed(_))));
    }

    #[tokio::test]
    async fn test_same_intent_cannot_be_submitted_twice() {
        let executor = executor();
        let order = entry();

        executor.submit(order.clone()).await.unwrap();
        assert!(executor.submit(order).await.is_err());
    }
}
