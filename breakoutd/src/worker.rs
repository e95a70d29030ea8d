//! Per-symbol worker task.
//!
//! Each tracked symbol gets one `SymbolWorker` consuming its own
//! [`CandleSource`]. Workers for different symbols run in parallel and only
//! meet at the shared [`PositionLedger`].
//!
//! # Tick pipeline
//!
//! ```text
//! candle
//!   → close validation         (non-positive close: dropped)
//!   → baseline average (window before this candle)
//!   → baseline update          (stale or overflowing candle: dropped)
//!   → mark to market           (open position only)
//!   → SignalDetector
//!   → capital snapshot + ledger reservation (risk gate)
//!   → OrderExecutor → exchange fill
//!   → ledger mutation → state transition
//! ```
//!
//! # State machine
//!
//! ```text
//! Idle → AwaitingEntryFill → Open → AwaitingAddFill → Open
//!                                 → AwaitingExitFill → Idle
//! ```
//!
//! Transitions follow confirmed fills only. A failed or rejected order puts
//! the symbol back in its prior stable state (`Idle` or `Open`) and is
//! reported as a missed signal; nothing is retried. A buy fill the ledger
//! refuses is sold back with an exit order for the filled quantity.
//!
//! # Cancellation
//!
//! The cancellation token is only observed while waiting for the next
//! candle, so an order in flight is always resolved before the worker stops.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use breakout_domain::{Candle, ExitReason, Fill, Position, Price, Symbol};
use breakout_engine::{EngineError, OrderSize, QuantityIntent, Signal, SignalDetector, VolumeBaseline};
use breakout_exec::{CandleSource, ExchangePort, OrderExecutor, OrderIntent, OrderKind};
use breakout_ledger::{LedgerError, PositionLedger};

use crate::event_bus::{DaemonEvent, EventBus, OrderFill};

// =============================================================================
// Symbol State
// =============================================================================

/// Lifecycle state of one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolState {
    /// No position
    Idle,
    /// Entry order submitted
    AwaitingEntryFill,
    /// Position live
    Open,
    /// Add-on order submitted, position still open
    AwaitingAddFill,
    /// Exit order submitted
    AwaitingExitFill,
}

impl SymbolState {
    /// Whether an order is in flight.
    pub fn is_awaiting(&self) -> bool {
        matches!(
            self,
            SymbolState::AwaitingEntryFill | SymbolState::AwaitingAddFill | SymbolState::AwaitingExitFill
        )
    }

    /// State to fall back to when the order in flight does not fill.
    pub fn stable(&self) -> SymbolState {
        match self {
            SymbolState::Idle | SymbolState::AwaitingEntryFill => SymbolState::Idle,
            SymbolState::Open | SymbolState::AwaitingAddFill | SymbolState::AwaitingExitFill => {
                SymbolState::Open
            },
        }
    }
}

impl fmt::Display for SymbolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolState::Idle => write!(f, "idle"),
            SymbolState::AwaitingEntryFill => write!(f, "awaiting_entry_fill"),
            SymbolState::Open => write!(f, "open"),
            SymbolState::AwaitingAddFill => write!(f, "awaiting_add_fill"),
            SymbolState::AwaitingExitFill => write!(f, "awaiting_exit_fill"),
        }
    }
}

/// Current state of every running worker, readable from the API.
#[derive(Debug, Default)]
pub struct SymbolStates {
    states: RwLock<HashMap<Symbol, SymbolState>>,
}

impl SymbolStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, symbol: &Symbol) -> Option<SymbolState> {
        self.states.read().await.get(symbol).copied()
    }

    pub async fn set(&self, symbol: &Symbol, state: SymbolState) {
        self.states.write().await.insert(symbol.clone(), state);
    }

    pub async fn remove(&self, symbol: &Symbol) -> Option<SymbolState> {
        self.states.write().await.remove(symbol)
    }

    /// All states, ordered by symbol.
    pub async fn all(&self) -> Vec<(Symbol, SymbolState)> {
        let mut all: Vec<(Symbol, SymbolState)> =
            self.states.read().await.iter().map(|(s, st)| (s.clone(), *st)).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

// =============================================================================
// Symbol Worker
// =============================================================================

/// Evaluation stream for one symbol.
pub struct SymbolWorker<E: ExchangePort + 'static> {
    symbol: Symbol,
    source: Box<dyn CandleSource>,
    baseline: VolumeBaseline,
    ledger: Arc<PositionLedger>,
    executor: Arc<OrderExecutor<E>>,
    event_bus: Arc<EventBus>,
    states: Arc<SymbolStates>,
    cancel: CancellationToken,
    state: SymbolState,
}

impl<E: ExchangePort + 'static> SymbolWorker<E> {
    /// Create a worker starting in `state`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        source: Box<dyn CandleSource>,
        ledger: Arc<PositionLedger>,
        executor: Arc<OrderExecutor<E>>,
        event_bus: Arc<EventBus>,
        states: Arc<SymbolStates>,
        cancel: CancellationToken,
        state: SymbolState,
    ) -> Self {
        let baseline = VolumeBaseline::new(ledger.params().volume_window());
        Self {
            symbol,
            source,
            baseline,
            ledger,
            executor,
            event_bus,
            states,
            cancel,
            state,
        }
    }

    /// Run until cancelled or the candle source ends.
    pub async fn run(mut self) {
        info!(
            symbol = %self.symbol,
            state = %self.state,
            window = self.baseline.window(),
            "Symbol worker started"
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!(symbol = %self.symbol, "Symbol worker cancelled");
                    break;
                }
                candle = self.source.next_candle() => candle,
            };

            let Some(candle) = next else {
                info!(symbol = %self.symbol, "Candle source closed");
                break;
            };
            self.on_candle(candle).await;
        }

        self.states.remove(&self.symbol).await;
        info!(symbol = %self.symbol, state = %self.state, "Symbol worker stopped");
    }

    /// Process one candle.
    pub async fn on_candle(&mut self, candle: Candle) {
        if candle.symbol != self.symbol {
            warn!(symbol = %self.symbol, received = %candle.symbol, "Candle for another symbol dropped");
            return;
        }

        let Ok(close) = Price::new(candle.close) else {
            warn!(symbol = %self.symbol, close = %candle.close, "Candle with non-positive close dropped");
            return;
        };

        let baseline_average = self.baseline.average().ok();
        if let Err(e) = self.baseline.update(&candle) {
            warn!(symbol = %self.symbol, error = %e, "Candle dropped");
            if let EngineError::StaleOrOutOfOrderCandle { last, received, .. } = e {
                self.event_bus.send(DaemonEvent::StaleCandle {
                    symbol: self.symbol.clone(),
                    last,
                    received,
                });
            }
            return;
        }

        let position = match self.ledger.mark_to_market(&self.symbol, close) {
            Ok(position) => Some(position),
            Err(LedgerError::NoSuchPosition(_)) => None,
            Err(e) => {
                error!(symbol = %self.symbol, error = %e, "Mark to market failed");
                return;
            },
        };

        let signal =
            SignalDetector::evaluate(&candle, baseline_average, self.ledger.params(), position.as_ref());
        debug!(
            symbol = %self.symbol,
            close = %candle.close,
            volume = %candle.volume,
            average = ?baseline_average,
            signal = signal.kind(),
            "Candle evaluated"
        );

        if signal.is_actionable() {
            self.event_bus.send(DaemonEvent::SignalDetected {
                symbol: self.symbol.clone(),
                signal: signal.clone(),
                candle_time: candle.timestamp,
            });
        }

        match (signal, position) {
            (Signal::NoSignal, _) => {},
            (Signal::Enter(intent), None) => self.enter(intent).await,
            (Signal::Add(intent), Some(_)) => self.add_on(intent).await,
            (Signal::Exit(reason), Some(position)) => self.exit(position, reason, close).await,
            (signal, position) => {
                error!(
                    symbol = %self.symbol,
                    signal = signal.kind(),
                    has_position = position.is_some(),
                    "Signal does not match position state"
                );
            },
        }
    }

    pub fn state(&self) -> SymbolState {
        self.state
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    async fn enter(&mut self, intent: QuantityIntent) {
        let Some(size) = self.reserve(OrderKind::Entry, &intent).await else {
            return;
        };

        let order = OrderIntent::entry(self.symbol.clone(), size.quantity, intent.reference_price);
        self.transition(SymbolState::AwaitingEntryFill).await;

        let Some(fill) = self.submit(order).await else {
            return;
        };

        match self.ledger.open_position(&self.symbol, &fill) {
            Ok(position) => {
                self.transition(SymbolState::Open).await;
                self.event_bus.send(DaemonEvent::PositionOpened(position));
            },
            Err(e) => self.ledger_failure(OrderKind::Entry, e, Some(fill)).await,
        }
    }

    async fn add_on(&mut self, intent: QuantityIntent) {
        let Some(size) = self.reserve(OrderKind::AddOn, &intent).await else {
            return;
        };

        let order = OrderIntent::add_on(self.symbol.clone(), size.quantity, intent.reference_price);
        self.transition(SymbolState::AwaitingAddFill).await;

        let Some(fill) = self.submit(order).await else {
            return;
        };

        match self.ledger.apply_add_on(&self.symbol, &fill) {
            Ok(position) => {
                self.transition(SymbolState::Open).await;
                self.event_bus.send(DaemonEvent::PositionAdded(position));
            },
            Err(e) => self.ledger_failure(OrderKind::AddOn, e, Some(fill)).await,
        }
    }

    async fn exit(&mut self, position: Position, reason: ExitReason, close: Price) {
        let order = OrderIntent::exit(self.symbol.clone(), position.quantity, close);
        self.transition(SymbolState::AwaitingExitFill).await;

        let Some(fill) = self.submit(order).await else {
            return;
        };

        if fill.quantity < position.quantity {
            match self.ledger.reduce_position(&self.symbol, fill.quantity, fill.price) {
                Ok(position) => {
                    self.transition(SymbolState::Open).await;
                    self.event_bus.send(DaemonEvent::PositionReduced(position));
                },
                Err(e) => self.ledger_failure(OrderKind::Exit, e, None).await,
            }
            return;
        }

        match self.ledger.close_position(&self.symbol, fill.price, reason) {
            Ok(closed) => {
                self.transition(SymbolState::Idle).await;
                self.event_bus.send(DaemonEvent::PositionClosed(closed));
            },
            Err(e) => self.ledger_failure(OrderKind::Exit, e, None).await,
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Size the order and pass it through the risk gate.
    async fn reserve(&mut self, kind: OrderKind, intent: &QuantityIntent) -> Option<OrderSize> {
        let capital = match self.executor.capital_snapshot().await {
            Ok(capital) => capital,
            Err(e) => {
                self.missed(kind, format!("capital snapshot unavailable: {}", e));
                return None;
            },
        };

        let size = match intent.resolve(capital.total_capital) {
            Ok(size) => size,
            Err(e) => {
                self.missed(kind, e.to_string());
                return None;
            },
        };

        let reserved = match kind {
            OrderKind::Entry => self.ledger.reserve_entry(&self.symbol, size.notional, &capital),
            OrderKind::AddOn | OrderKind::Exit => {
                self.ledger.reserve_add(&self.symbol, size.notional, &capital)
            },
        };

        match reserved {
            Ok(()) => Some(size),
            Err(e) => {
                self.missed(kind, e.to_string());
                None
            },
        }
    }

    /// Submit `order`; `None` when nothing filled, after reverting state.
    async fn submit(&mut self, order: OrderIntent) -> Option<Fill> {
        let kind = order.kind;
        let requested = order.quantity;

        let result = match self.executor.submit(order).await {
            Ok(result) => result,
            Err(e) => {
                self.abandon(kind, e.to_string()).await;
                return None;
            },
        };

        let Some(fill) = result.as_fill() else {
            let reason = result.message.unwrap_or_else(|| "nothing filled".to_string());
            self.abandon(kind, reason).await;
            return None;
        };

        if result.is_partial(requested) {
            warn!(
                symbol = %self.symbol,
                %kind,
                requested = %requested,
                filled = %fill.quantity,
                "Partial fill"
            );
        }

        self.event_bus.send(DaemonEvent::OrderFilled(OrderFill {
            symbol: self.symbol.clone(),
            order_id: result.client_order_id,
            kind,
            fill_price: fill.price,
            filled_quantity: fill.quantity,
            filled_at: fill.filled_at,
        }));
        Some(fill)
    }

    /// Give up on the order in flight: release its reservation and revert.
    async fn abandon(&mut self, kind: OrderKind, reason: String) {
        if kind != OrderKind::Exit {
            if let Err(e) = self.ledger.release(&self.symbol) {
                error!(symbol = %self.symbol, error = %e, "Failed to release reservation");
            }
        }
        self.missed(kind, reason);
        self.transition(self.state.stable()).await;
    }

    /// The exchange filled but the ledger refused the fill. A refused buy
    /// is unwound before the reservation is released.
    async fn ledger_failure(&mut self, kind: OrderKind, e: LedgerError, refused: Option<Fill>) {
        if e.is_invariant_violation() {
            error!(symbol = %self.symbol, %kind, error = %e, "Ledger invariant violation, fill not applied");
        } else {
            warn!(symbol = %self.symbol, %kind, error = %e, "Fill not applied");
        }
        if let Some(fill) = refused {
            self.unwind(&fill).await;
        }
        self.abandon(kind, e.to_string()).await;
    }

    /// Sell back exactly what a refused buy filled.
    async fn unwind(&self, fill: &Fill) {
        let order = OrderIntent::exit(self.symbol.clone(), fill.quantity, fill.price);
        match self.executor.submit(order).await {
            Ok(result) => match result.as_fill() {
                Some(sold) if sold.quantity >= fill.quantity => {
                    info!(
                        symbol = %self.symbol,
                        quantity = %sold.quantity,
                        price = %sold.price,
                        "Refused fill unwound"
                    );
                },
                Some(sold) => {
                    error!(
                        symbol = %self.symbol,
                        filled = %fill.quantity,
                        sold = %sold.quantity,
                        "Refused fill only partly unwound"
                    );
                },
                None => {
                    error!(
                        symbol = %self.symbol,
                        quantity = %fill.quantity,
                        reason = ?result.message,
                        "Unwind order not filled"
                    );
                },
            },
            Err(e) => {
                error!(symbol = %self.symbol, quantity = %fill.quantity, error = %e, "Unwind order failed");
            },
        }
    }

    fn missed(&self, kind: OrderKind, reason: String) {
        warn!(symbol = %self.symbol, %kind, %reason, "Missed signal");
        self.event_bus.send(DaemonEvent::MissedSignal {
            symbol: self.symbol.clone(),
            kind,
            reason,
        });
    }

    async fn transition(&mut self, new: SymbolState) {
        if new == self.state {
            return;
        }
        let previous = self.state;
        self.state = new;
        self.states.set(&self.symbol, new).await;

        debug!(symbol = %self.symbol, %previous, %new, "Symbol state changed");
        self.event_bus.send(DaemonEvent::SymbolStateChanged {
            symbol: self.symbol.clone(),
            previous,
            new,
            timestamp: Utc::now(),
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
