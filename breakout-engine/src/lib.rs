//! Breakout Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes a candle and the current state, returns what to do.

#![warn(clippy::all)]

pub mod baseline;
pub mod error;
pub mod risk;
pub mod signal;

pub use baseline::VolumeBaseline;
pub use error::{EngineError, EngineResult};
pub use risk::{Exposure, RiskController, RiskRejection};
pub use signal::{OrderSize, QuantityIntent, Signal, SignalDetector};
