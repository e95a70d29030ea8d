//! Strategy orchestrator: owns the per-symbol workers.
//!
//! ```text
//! CandleSource (per symbol) → SymbolWorker ─┐
//! CandleSource (per symbol) → SymbolWorker ─┼→ PositionLedger (shared, risk-gated)
//! CandleSource (per symbol) → SymbolWorker ─┘        ↓
//!                                             OrderExecutor → Exchange
//! ```
//!
//! Every worker gets a child of the orchestrator's cancellation token, so a
//! single symbol can be disabled and [`StrategyOrchestrator::shutdown`] stops
//! them all. Disabling waits for the worker to finish, which includes any
//! order it has in flight.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use breakout_domain::Symbol;
use breakout_exec::{CandleSource, ExchangePort, OrderExecutor};
use breakout_ledger::{LedgerSummary, PositionLedger};

use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{DaemonEvent, EventBus};
use crate::worker::{SymbolState, SymbolStates, SymbolWorker};

struct WorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// State of one tracked symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolStatus {
    pub symbol: String,
    pub state: SymbolState,
}

/// Orchestrator status report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub symbols: Vec<SymbolStatus>,
    pub ledger: LedgerSummary,
}

/// Runs one [`SymbolWorker`] per tracked symbol.
pub struct StrategyOrchestrator<E: ExchangePort + 'static> {
    ledger: Arc<PositionLedger>,
    executor: Arc<OrderExecutor<E>>,
    event_bus: Arc<EventBus>,
    states: Arc<SymbolStates>,
    workers: Mutex<HashMap<Symbol, WorkerHandle>>,
    shutdown: CancellationToken,
}

impl<E: ExchangePort + 'static> StrategyOrchestrator<E> {
    pub fn new(
        ledger: Arc<PositionLedger>,
        executor: Arc<OrderExecutor<E>>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            ledger,
            executor,
            event_bus,
            states: Arc::new(SymbolStates::new()),
            workers: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<PositionLedger> {
        &self.ledger
    }

    pub fn executor(&self) -> &Arc<OrderExecutor<E>> {
        &self.executor
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Start evaluating `symbol` from `source`.
    ///
    /// A symbol that still has a position in the ledger (e.g. disabled and
    /// tracked again) resumes in `Open`.
    ///
    /// # Errors
    /// `SymbolAlreadyTracked` while a worker for the symbol is running.
    pub async fn track<S>(&self, symbol: Symbol, source: S) -> DaemonResult<()>
    where
        S: CandleSource + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(DaemonError::Shutdown);
        }

        let mut workers = self.workers.lock().await;
        if workers.get(&symbol).is_some_and(|w| !w.task.is_finished()) {
            return Err(DaemonError::SymbolAlreadyTracked(symbol));
        }

        let initial = if self.ledger.position(&symbol)?.is_some() {
            SymbolState::Open
        } else {
            SymbolState::Idle
        };
        self.states.set(&symbol, initial).await;

        let cancel = self.shutdown.child_token();
        let worker = SymbolWorker::new(
            symbol.clone(),
            Box::new(source),
            self.ledger.clone(),
            self.executor.clone(),
            self.event_bus.clone(),
            self.states.clone(),
            cancel.clone(),
            initial,
        );
        let task = tokio::spawn(worker.run());
        workers.insert(symbol.clone(), WorkerHandle { cancel, task });

        info!(%symbol, state = %initial, "Tracking symbol");
        Ok(())
    }

    /// Stop evaluating `symbol` at the next tick boundary.
    ///
    /// Returns once the worker has stopped. An order in flight is resolved
    /// first; an open position stays in the ledger.
    pub async fn disable(&self, symbol: &Symbol) -> DaemonResult<()> {
        let handle = self
            .workers
            .lock()
            .await
            .remove(symbol)
            .ok_or_else(|| DaemonError::SymbolNotTracked(symbol.clone()))?;

        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            error!(%symbol, error = %e, "Symbol worker panicked");
        }
        self.states.remove(symbol).await;

        info!(%symbol, "Symbol disabled");
        Ok(())
    }

    /// Symbols with a running worker, ordered.
    pub async fn tracked_symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self
            .workers
            .lock()
            .await
            .iter()
            .filter(|(_, w)| !w.task.is_finished())
            .map(|(symbol, _)| symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    /// Lifecycle state of a running worker.
    pub async fn symbol_state(&self, symbol: &Symbol) -> Option<SymbolState> {
        self.states.get(symbol).await
    }

    pub async fn status(&self) -> DaemonResult<OrchestratorStatus> {
        let symbols = self
            .states
            .all()
            .await
            .into_iter()
            .map(|(symbol, state)| SymbolStatus {
                symbol: symbol.as_pair(),
                state,
            })
            .collect();

        Ok(OrchestratorStatus {
            symbols,
            ledger: self.ledger.summary()?,
        })
    }

    /// Stop every worker and wait for them.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<(Symbol, WorkerHandle)> = self.workers.lock().await.drain().collect();
        let count = handles.len();
        for (symbol, handle) in handles {
            if let Err(e) = handle.task.await {
                error!(%symbol, error = %e, "Symbol worker panicked");
            }
        }

        self.event_bus.send(DaemonEvent::Shutdown);
        info!(workers = count, "Orchestrator stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
