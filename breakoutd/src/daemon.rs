//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Strategy Orchestrator (one worker per symbol)
//! - Event Bus (internal communication)
//! - API Server (HTTP endpoints)
//! - Candle Feed (streaming candle source)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Check the exchange and track the configured symbols
//! 4. Start API server
//! 5. Main event loop (log events)
//! 6. Graceful shutdown on SIGINT

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use breakout_exec::{CandleFeed, ExchangePort, IntentJournal, OrderExecutor, StubExchange};
use breakout_ledger::PositionLedger;

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{DaemonEvent, EventBus};
use crate::orchestrator::StrategyOrchestrator;

// =============================================================================
// Daemon
// =============================================================================

/// The breakout daemon.
pub struct Daemon<E: ExchangePort + 'static> {
    /// Configuration
    config: Config,
    /// Symbol workers
    orchestrator: Arc<StrategyOrchestrator<E>>,
    /// Event bus
    event_bus: Arc<EventBus>,
    /// Streaming candle feed
    feed: Arc<CandleFeed>,
}

impl Daemon<StubExchange> {
    /// Create a new daemon with stub components (for testing/development).
    ///
    /// Candles arrive through `POST /candles`.
    pub fn new_stub(config: Config) -> Self {
        let exchange = Arc::new(StubExchange::new(config.strategy.total_capital));
        let journal = Arc::new(IntentJournal::new());
        let executor = Arc::new(OrderExecutor::new(exchange, journal));
        let ledger = Arc::new(PositionLedger::new(
            config.strategy.params,
            config.strategy.total_capital,
        ));
        let event_bus = Arc::new(EventBus::new(1000));

        let orchestrator = Arc::new(StrategyOrchestrator::new(ledger, executor, event_bus.clone()));

        Self {
            config,
            orchestrator,
            event_bus,
            feed: Arc::new(CandleFeed::default()),
        }
    }
}

impl<E: ExchangePort + 'static> Daemon<E> {
    /// Create a new daemon with provided components.
    pub fn new(
        config: Config,
        orchestrator: Arc<StrategyOrchestrator<E>>,
        event_bus: Arc<EventBus>,
        feed: Arc<CandleFeed>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            event_bus,
            feed,
        }
    }

    pub fn orchestrator(&self) -> &Arc<StrategyOrchestrator<E>> {
        &self.orchestrator
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            params = %self.config.strategy.params,
            total_capital = %self.config.strategy.total_capital,
            "Starting breakout daemon"
        );

        // 1. Exchange must be reachable before anything trades
        self.orchestrator.executor().exchange().health_check().await?;

        // 2. Track configured symbols
        self.track_configured_symbols().await?;

        // 3. Start API server
        let api_addr = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 4. Subscribe to event bus
        let mut event_receiver = self.event_bus.subscribe();

        // 5. Main event loop
        info!("Entering main event loop");
        loop {
            tokio::select! {
                Some(event_result) = event_receiver.recv() => {
                    match event_result {
                        Ok(event) => {
                            if let Err(DaemonError::Shutdown) = self.handle_event(event) {
                                break;
                            }
                        }
                        Err(lag_msg) => {
                            warn!(%lag_msg, "Event receiver lagged");
                        }
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        // 6. Graceful shutdown
        self.shutdown().await
    }

    async fn track_configured_symbols(&self) -> DaemonResult<()> {
        for symbol in &self.config.strategy.symbols {
            let source = self.feed.subscribe(symbol)?;
            self.orchestrator.track(symbol.clone(), source).await?;
        }
        info!(count = self.config.strategy.symbols.len(), "Configured symbols tracked");
        Ok(())
    }

    /// Start the API server.
    async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let state = Arc::new(ApiState {
            orchestrator: self.orchestrator.clone(),
            feed: Some(self.feed.clone()),
        });

        let router = create_router(state);
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| DaemonError::Config(format!("Failed to get local address: {}", e)))?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    /// Log an event from the event bus.
    fn handle_event(&self, event: DaemonEvent) -> DaemonResult<()> {
        match event {
            DaemonEvent::SignalDetected { symbol, signal, candle_time } => {
                info!(%symbol, signal = signal.kind(), %candle_time, "Signal detected");
            },

            DaemonEvent::OrderFilled(fill) => {
                info!(
                    symbol = %fill.symbol,
                    order_id = %fill.order_id,
                    kind = %fill.kind,
                    fill_price = %fill.fill_price,
                    filled_quantity = %fill.filled_quantity,
                    "Order filled"
                );
            },

            DaemonEvent::MissedSignal { symbol, kind, reason } => {
                warn!(%symbol, %kind, %reason, "Missed signal");
            },

            DaemonEvent::PositionOpened(position) | DaemonEvent::PositionAdded(position) => {
                info!(%position, "Position updated");
            },

            DaemonEvent::PositionReduced(position) => {
                warn!(%position, "Position reduced by partial exit");
            },

            DaemonEvent::PositionClosed(closed) => {
                info!(
                    symbol = %closed.position.symbol,
                    exit_price = %closed.exit_price,
                    realized_pnl = %closed.realized_pnl,
                    reason = %closed.exit_reason,
                    "Position closed"
                );
            },

            DaemonEvent::StaleCandle { symbol, last, received } => {
                warn!(%symbol, %last, %received, "Stale candle");
            },

            DaemonEvent::SymbolStateChanged { symbol, previous, new, .. } => {
                debug!(%symbol, %previous, %new, "Symbol state changed");
            },

            DaemonEvent::Shutdown => {
                info!("Shutdown event received");
                return Err(DaemonError::Shutdown);
            },
        }

        Ok(())
    }

    /// Graceful shutdown.
    async fn shutdown(&self) -> DaemonResult<()> {
        info!("Initiating graceful shutdown");

        self.orchestrator.shutdown().await;

        let summary = self.orchestrator.ledger().summary()?;
        info!(
            open_positions = summary.positions_count,
            realized_pnl = %summary.realized_pnl,
            "Shutdown complete"
        );

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use breakout_domain::Symbol;

    #[tokio::test]
    async fn test_daemon_stub_creation() {
        let daemon = Daemon::new_stub(Config::test());

        let summary = daemon.orchestrator().ledger().summary().unwrap();
        assert_eq!(summary.positions_count, 0);
        assert_eq!(daemon.orchestrator().ledger().params().volume_window(), 3);
    }

    #[tokio::test]
    async fn test_daemon_tracks_configured_symbols() {
        let mut config = Config::test();
        config.strategy.symbols = vec![
            Symbol::from_pair("BTCUSDT").unwrap(),
            Symbol::from_pair("ETHUSDT").unwrap(),
        ];
        let daemon = Daemon::new_stub(config);

        daemon.track_configured_symbols().await.unwrap();

        assert_eq!(daemon.orchestrator().tracked_symbols().await.len(), 2);
        assert_eq!(daemon.feed.subscribed_symbols().len(), 2);
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let daemon = Daemon::new_stub(Config::test());

        let addr = daemon.start_api_server().await.unwrap();
        assert!(addr.port() > 0);

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
    }

    #[test]
    fn test_shutdown_event_stops_loop() {
        let daemon = Daemon::new_stub(Config::test());
        assert!(matches!(
            daemon.handle_event(DaemonEvent::Shutdown),
            Err(DaemonError::Shutdown)
        ));
    }
}
