//! Breakout Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains the position entity, value objects, strategy parameters
//! and the trailing-stop rules shared by the engine and the ledger.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod account;
pub mod entities;
pub mod market_data;
pub mod parameters;
pub mod trailing;
pub mod value_objects;

// Re-export commonly used types
pub use account::{CapitalSnapshot, Fill};
pub use entities::{ClosedPosition, ExitReason, Position, PositionId};
pub use market_data::Candle;
pub use parameters::{OrderSizeLimits, StrategyParameters};
pub use value_objects::{DomainError, OrderSide, Price, Quantity, Symbol};
