//! Breakout Ledger
//!
//! Authoritative in-memory record of open positions, orders in flight and
//! committed capital, shared by every per-symbol worker.

#![warn(clippy::all)]

pub mod error;
pub mod ledger;

pub use error::{LedgerError, LedgerResult};
pub use ledger::{
    LedgerSnapshot, LedgerSummary, PositionLedger, PositionSummary, Reservation, ReservationKind,
};
