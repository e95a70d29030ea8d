//! Shared harness: orchestrator wired to a stub exchange and a streaming feed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use breakout_domain::{Candle, StrategyParameters, Symbol};
use breakout_exec::{CandleFeed, IntentJournal, OrderExecutor, StubExchange};
use breakout_ledger::PositionLedger;
use breakoutd::{DaemonEvent, EventBus, EventReceiver, StrategyOrchestrator, SymbolState};

pub struct Harness {
    pub exchange: Arc<StubExchange>,
    pub journal: Arc<IntentJournal>,
    pub ledger: Arc<PositionLedger>,
    pub orchestrator: StrategyOrchestrator<StubExchange>,
    pub feed: CandleFeed,
    pub events: EventReceiver,
}

impl Harness {
    pub async fn new(params: StrategyParameters, capital: Decimal, pairs: &[&str]) -> Self {
        let exchange = Arc::new(StubExchange::new(capital));
        let journal = Arc::new(IntentJournal::new());
        let executor = Arc::new(OrderExecutor::new(exchange.clone(), journal.clone()));
        let ledger = Arc::new(PositionLedger::new(params, capital));
        let event_bus = Arc::new(EventBus::new(10_000));
        let events = event_bus.subscribe();
        let orchestrator = StrategyOrchestrator::new(ledger.clone(), executor, event_bus);
        let feed = CandleFeed::new(64);

        for pair in pairs {
            let symbol = symbol(pair);
            let source = feed.subscribe(&symbol).unwrap();
            orchestrator.track(symbol, source).await.unwrap();
        }

        Self {
            exchange,
            journal,
            ledger,
            orchestrator,
            feed,
            events,
        }
    }

    pub async fn publish(&self, candle: Candle) {
        self.feed.publish(candle).await.unwrap();
    }

    /// Publish `count` flat candles with the given volume, starting at `minute`.
    pub async fn warm_up(&self, pair: &str, minute: i64, count: i64, volume: Decimal) {
        for i in 0..count {
            self.publish(candle(pair, minute + i, dec(100), dec(100), volume)).await;
        }
    }

    /// Wait for the first event matching `pred`.
    pub async fn wait_for<F>(&mut self, pred: F) -> DaemonEvent
    where
        F: Fn(&DaemonEvent) -> bool,
    {
        let events = &mut self.events;
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Some(Ok(event)) if pred(&event) => return event,
                    Some(_) => continue,
                    None => panic!("event bus closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Wait until the symbol's worker reaches `state`.
    pub async fn wait_for_state(&mut self, pair: &str, state: SymbolState) {
        let target = symbol(pair);
        if self.orchestrator.symbol_state(&target).await == Some(state) {
            return;
        }
        self.wait_for(|event| {
            matches!(event, DaemonEvent::SymbolStateChanged { symbol, new, .. }
                if *symbol == target && *new == state)
        })
        .await;
    }
}

pub fn symbol(pair: &str) -> Symbol {
    Symbol::from_pair(pair).unwrap()
}

pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}

pub fn at(minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::minutes(minute)
}

pub fn candle(pair: &str, minute: i64, open: Decimal, close: Decimal, volume: Decimal) -> Candle {
    Candle::new(symbol(pair), at(minute), open, open.max(close), open.min(close), close, volume)
}

/// R=3, N=2, M=1.5, Q=10, U=2, S=3, max 3 positions.
pub fn params() -> StrategyParameters {
    params_with(Decimal::from(2), Decimal::from(10), 3)
}

pub fn params_with(add_on_pct: Decimal, capital_fraction_pct: Decimal, max_positions: usize) -> StrategyParameters {
    StrategyParameters::new(
        3,
        Decimal::from(2),
        Decimal::new(15, 1),
        capital_fraction_pct,
        add_on_pct,
        Decimal::from(3),
        max_positions,
    )
    .unwrap()
}
