//! Breakout Daemon Library
//!
//! Runtime for the volume and price breakout strategy.
//!
//! # Architecture
//!
//! ```text
//! CandleSource (push or poll) → SymbolWorker (one per symbol)
//!                                   ↓
//!              VolumeBaseline → SignalDetector → PositionLedger (risk-gated)
//!                                   ↓
//!                         OrderExecutor → Exchange
//!                                   ↓
//!                         Event Bus → Daemon log, API
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Strategy Orchestrator**: Starts, disables and stops symbol workers
//! - **Symbol Worker**: Per-symbol tick pipeline and fill-driven state machine
//! - **Event Bus**: Internal communication (workers → daemon, tests)
//! - **API**: HTTP endpoints for status, disable and candle publishing
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use breakoutd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_stub(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event_bus;
pub mod orchestrator;
pub mod worker;

// Re-exports for convenience
pub use api::{create_router, ApiState, CandleRequest};
pub use config::{ApiConfig, Config, Environment, StrategyConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{DaemonEvent, EventBus, EventReceiver, OrderFill};
pub use orchestrator::{OrchestratorStatus, StrategyOrchestrator, SymbolStatus};
pub use worker::{SymbolState, SymbolStates, SymbolWorker};
