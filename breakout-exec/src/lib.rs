//! Breakout Execution Layer
//!
//! Everything that talks to the outside world on behalf of the strategy.
//!
//! # Architecture
//!
//! ```text
//! CandleSource → worker → OrderExecutor → Intent Journal → ExchangePort → FillResult
//! ```
//!
//! # Components
//!
//! - **Ports**: `ExchangePort` plus the order and fill types crossing it
//! - **Feed**: transport-agnostic candle sources (push and poll)
//! - **Intent Journal**: audit trail of every order submitted
//! - **Executor**: submits intents through the journal to the exchange
//! - **Stub**: in-memory exchange for tests and development

#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod feed;
pub mod intent;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use executor::OrderExecutor;
pub use feed::{CandleFeed, CandlePoller, CandleSource, PollingCandleSource, StreamingCandleSource};
pub use intent::{Intent, IntentJournal, IntentResult, IntentStatus};
pub use ports::{ExchangePort, FillResult, OrderIntent, OrderKind};
pub use stub::StubExchange;
