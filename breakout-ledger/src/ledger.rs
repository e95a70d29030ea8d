//! In-memory position ledger
//!
//! A single `RwLock` guards all ledger state. Every mutation takes the write
//! lock, so writes for one symbol are serialized and no reader ever observes
//! half of a multi-field update. Reads share the lock and see one consistent
//! global view.
//!
//! Orders in flight are held as reservations: the risk check and the
//! reservation happen under the same write lock, and the reservation counts
//! toward committed capital (and, for entries, toward the position count)
//! until its fill is applied or it is released.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use breakout_domain::{
    CapitalSnapshot, ClosedPosition, ExitReason, Fill, Position, Price, Quantity,
    StrategyParameters, Symbol,
};
use breakout_engine::{Exposure, RiskController};

use crate::error::{LedgerError, LedgerResult};

// =============================================================================
// Reservations
// =============================================================================

/// What a reservation is holding capital for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationKind {
    Entry,
    AddOn,
}

/// Capital held for an order in flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub kind: ReservationKind,
    pub notional: Decimal,
    pub reserved_at: DateTime<Utc>,
}

// =============================================================================
// Snapshots
// =============================================================================

/// Point-in-time view of ledger capital and counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub total_capital: Decimal,
    /// Sum of `total_invested` over open positions
    pub invested: Decimal,
    /// Sum of reservation notionals
    pub reserved: Decimal,
    pub open_symbols: BTreeSet<Symbol>,
    pub pending_entries: usize,
}

impl LedgerSnapshot {
    pub fn committed(&self) -> Decimal {
        self.invested.saturating_add(self.reserved)
    }

    /// Open positions plus entries in flight.
    pub fn open_positions(&self) -> usize {
        self.open_symbols.len() + self.pending_entries
    }

    pub fn exposure(&self) -> Exposure {
        Exposure {
            total_capital: self.total_capital,
            committed: self.committed(),
            open_symbols: self.open_symbols.clone(),
            pending_entries: self.pending_entries,
        }
    }
}

/// One row of the status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSummary {
    pub symbol: Symbol,
    pub entry_price: Price,
    pub quantity: Quantity,
    pub last_price: Price,
    pub highest_price: Price,
    pub stop_loss_price: Price,
    pub total_invested: Decimal,
    pub current_pnl: Decimal,
    pub pnl_pct: Decimal,
    pub add_on_count: u32,
    pub entry_time: DateTime<Utc>,
}

impl From<&Position> for PositionSummary {
    fn from(position: &Position) -> Self {
        Self {
            symbol: position.symbol.clone(),
            entry_price: position.entry_price,
            quantity: position.quantity,
            last_price: position.last_price,
            highest_price: position.highest_price,
            stop_loss_price: position.stop_loss_price,
            total_invested: position.total_invested,
            current_pnl: position.current_pnl,
            pnl_pct: position.pnl_pct(),
            add_on_count: position.add_on_count,
            entry_time: position.entry_time,
        }
    }
}

/// Aggregate status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_capital: Decimal,
    pub positions_count: usize,
    pub pending_orders: usize,
    pub total_invested: Decimal,
    pub reserved: Decimal,
    /// Unrealized P&L across open positions
    pub total_pnl: Decimal,
    /// `total_pnl / total_invested × 100`
    pub pnl_pct: Decimal,
    pub realized_pnl: Decimal,
    pub closed_count: usize,
    pub positions: Vec<PositionSummary>,
}

// =============================================================================
// PositionLedger
// =============================================================================

/// Closed positions kept for reporting; older records are dropped.
pub const DEFAULT_CLOSED_HISTORY: usize = 1_000;

#[derive(Debug, Default)]
struct LedgerState {
    total_capital: Decimal,
    positions: HashMap<Symbol, Position>,
    reservations: HashMap<Symbol, Reservation>,
    /// Most recent closes, oldest first
    closed: VecDeque<ClosedPosition>,
    closed_count: usize,
    realized_pnl: Decimal,
}

impl LedgerState {
    fn invested(&self) -> Decimal {
        self.positions
            .values()
            .fold(Decimal::ZERO, |sum, p| sum.saturating_add(p.total_invested))
    }

    fn reserved(&self) -> Decimal {
        self.reservations
            .values()
            .fold(Decimal::ZERO, |sum, r| sum.saturating_add(r.notional))
    }

    fn pending_entries(&self) -> usize {
        self.reservations.values().filter(|r| r.kind == ReservationKind::Entry).count()
    }

    /// Entries in flight for symbols other than `symbol`.
    fn pending_entries_besides(&self, symbol: &Symbol) -> usize {
        self.reservations
            .iter()
            .filter(|(s, r)| r.kind == ReservationKind::Entry && *s != symbol)
            .count()
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            total_capital: self.total_capital,
            invested: self.invested(),
            reserved: self.reserved(),
            open_symbols: self.positions.keys().cloned().collect(),
            pending_entries: self.pending_entries(),
        }
    }

    /// Ledger exposure merged with the exchange's view of committed capital.
    fn exposure_with(&mut self, capital: &CapitalSnapshot) -> Exposure {
        self.total_capital = capital.total_capital;
        let mut exposure = self.snapshot().exposure();
        exposure.committed = exposure.committed.max(capital.total_committed);
        exposure
    }

    /// Check a fill for `symbol` fits; its own reservation is the one the
    /// fill consumes, so it does not count as committed.
    fn ensure_capital(&self, symbol: &Symbol, cost: Decimal) -> LedgerResult<()> {
        let own = self.reservations.get(symbol).map_or(Decimal::ZERO, |r| r.notional);
        let committed = self.invested().saturating_add(self.reserved()) - own;
        let after = committed.checked_add(cost);
        if after.map_or(true, |after| after > self.total_capital) {
            return Err(LedgerError::CapitalExceeded {
                symbol: symbol.clone(),
                committed,
                cost,
                total: self.total_capital,
            });
        }
        Ok(())
    }

    fn record_closed(&mut self, closed: ClosedPosition, history: usize) {
        self.closed_count += 1;
        self.closed.push_back(closed);
        while self.closed.len() > history {
            self.closed.pop_front();
        }
    }
}

/// Shared ledger of positions and committed capital.
#[derive(Debug)]
pub struct PositionLedger {
    risk: RiskController,
    closed_history: usize,
    state: RwLock<LedgerState>,
}

impl PositionLedger {
    /// Create an empty ledger.
    pub fn new(params: StrategyParameters, total_capital: Decimal) -> Self {
        Self {
            risk: RiskController::new(params),
            closed_history: DEFAULT_CLOSED_HISTORY,
            state: RwLock::new(LedgerState {
                total_capital,
                ..LedgerState::default()
            }),
        }
    }

    /// Keep at most `limit` closed positions for reporting.
    pub fn with_closed_history(mut self, limit: usize) -> Self {
        self.closed_history = limit;
        self
    }

    pub fn params(&self) -> &StrategyParameters {
        self.risk.params()
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.state.read().map_err(|e| LedgerError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state.write().map_err(|e| LedgerError::LockPoisoned(e.to_string()))
    }

    // -------------------------------------------------------------------------
    // Risk-gated reservations
    // -------------------------------------------------------------------------

    /// Risk-check and reserve capital for a new position on `symbol`.
    ///
    /// # Errors
    /// - `DuplicatePosition` / `PendingOrder` if the symbol is not idle
    /// - `RiskRejected` naming the rule that failed
    pub fn reserve_entry(
        &self,
        symbol: &Symbol,
        notional: Decimal,
        capital: &CapitalSnapshot,
    ) -> LedgerResult<()> {
        let mut state = self.write()?;

        if state.positions.contains_key(symbol) {
            return Err(LedgerError::DuplicatePosition(symbol.clone()));
        }
        if state.reservations.contains_key(symbol) {
            return Err(LedgerError::PendingOrder(symbol.clone()));
        }

        let exposure = state.exposure_with(capital);
        self.risk.check_entry(notional, &exposure)?;

        state.reservations.insert(
            symbol.clone(),
            Reservation {
                kind: ReservationKind::Entry,
                notional,
                reserved_at: Utc::now(),
            },
        );
        debug!(%symbol, %notional, "Entry reserved");
        Ok(())
    }

    /// Risk-check and reserve capital for an add-on to the open position.
    pub fn reserve_add(
        &self,
        symbol: &Symbol,
        notional: Decimal,
        capital: &CapitalSnapshot,
    ) -> LedgerResult<()> {
        let mut state = self.write()?;

        if !state.positions.contains_key(symbol) {
            return Err(LedgerError::NoSuchPosition(symbol.clone()));
        }
        if state.reservations.contains_key(symbol) {
            return Err(LedgerError::PendingOrder(symbol.clone()));
        }

        let exposure = state.exposure_with(capital);
        self.risk.check_add(symbol, notional, &exposure)?;

        state.reservations.insert(
            symbol.clone(),
            Reservation {
                kind: ReservationKind::AddOn,
                notional,
                reserved_at: Utc::now(),
            },
        );
        debug!(%symbol, %notional, "Add-on reserved");
        Ok(())
    }

    /// Drop the reservation for `symbol` after a failed or rejected order.
    pub fn release(&self, symbol: &Symbol) -> LedgerResult<Option<Reservation>> {
        let released = self.write()?.reservations.remove(symbol);
        if let Some(reservation) = &released {
            debug!(%symbol, notional = %reservation.notional, "Reservation released");
        }
        Ok(released)
    }

    // -------------------------------------------------------------------------
    // Fills
    // -------------------------------------------------------------------------

    /// Create the position for a filled entry order, consuming its reservation.
    ///
    /// The reservation is only consumed once the fill is accepted.
    ///
    /// # Errors
    /// - `DuplicatePosition` if a position already exists
    /// - `CapitalExceeded` / `MaxPositionsExceeded` if the actual fill would
    ///   break a ledger invariant
    /// - `Domain` if the fill cost is not representable
    pub fn open_position(&self, symbol: &Symbol, fill: &Fill) -> LedgerResult<Position> {
        let mut state = self.write()?;

        if state.positions.contains_key(symbol) {
            return Err(LedgerError::DuplicatePosition(symbol.clone()));
        }

        state.ensure_capital(symbol, fill.cost()?)?;

        let max = self.risk.params().max_positions();
        if state.positions.len() + state.pending_entries_besides(symbol) + 1 > max {
            return Err(LedgerError::MaxPositionsExceeded { symbol: symbol.clone(), max });
        }

        let position = Position::open(
            symbol.clone(),
            fill.price,
            fill.quantity,
            self.risk.params().trailing_stop_pct(),
            fill.filled_at,
        )?;
        let reservation = state.reservations.remove(symbol);
        state.positions.insert(symbol.clone(), position.clone());

        info!(
            %symbol,
            position_id = %position.id,
            entry_price = %position.entry_price,
            quantity = %position.quantity,
            reserved = ?reservation.map(|r| r.notional),
            "Position opened"
        );
        Ok(position)
    }

    /// Grow the open position with a filled add-on, consuming its reservation.
    ///
    /// On error the position and the reservation are left as they were.
    pub fn apply_add_on(&self, symbol: &Symbol, fill: &Fill) -> LedgerResult<Position> {
        let mut state = self.write()?;

        let mut position = state
            .positions
            .get(symbol)
            .cloned()
            .ok_or_else(|| LedgerError::NoSuchPosition(symbol.clone()))?;

        state.ensure_capital(symbol, fill.cost()?)?;
        position.apply_add_on(
            fill.price,
            fill.quantity,
            self.risk.params().trailing_stop_pct(),
            fill.filled_at,
        )?;

        state.reservations.remove(symbol);
        state.positions.insert(symbol.clone(), position.clone());

        info!(
            %symbol,
            position_id = %position.id,
            add_on_count = position.add_on_count,
            entry_price = %position.entry_price,
            quantity = %position.quantity,
            "Add-on applied"
        );
        Ok(position)
    }

    /// Revalue the open position at `price`.
    ///
    /// # Errors
    /// `Domain` when the position cannot be valued at `price`; the position
    /// keeps its previous valuation.
    pub fn mark_to_market(&self, symbol: &Symbol, price: Price) -> LedgerResult<Position> {
        let mut state = self.write()?;
        let trailing_stop_pct = self.risk.params().trailing_stop_pct();

        let position = state
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::NoSuchPosition(symbol.clone()))?;
        position.mark_to_market(price, trailing_stop_pct, Utc::now())?;

        Ok(position.clone())
    }

    /// Apply a partial exit fill; the position stays open with the remainder.
    pub fn reduce_position(
        &self,
        symbol: &Symbol,
        quantity: Quantity,
        exit_price: Price,
    ) -> LedgerResult<Position> {
        let mut state = self.write()?;

        let position = state
            .positions
            .get_mut(symbol)
            .ok_or_else(|| LedgerError::NoSuchPosition(symbol.clone()))?;
        let realized = position.reduce(quantity, exit_price, Utc::now())?;
        let position = position.clone();
        state.realized_pnl = state.realized_pnl.saturating_add(realized);

        warn!(
            %symbol,
            filled = %quantity,
            remaining = %position.quantity,
            %realized,
            "Partial exit fill"
        );
        Ok(position)
    }

    /// Remove the open position, recording its realized P&L.
    pub fn close_position(
        &self,
        symbol: &Symbol,
        exit_price: Price,
        reason: ExitReason,
    ) -> LedgerResult<ClosedPosition> {
        let mut state = self.write()?;

        let position = state
            .positions
            .get(symbol)
            .cloned()
            .ok_or_else(|| LedgerError::NoSuchPosition(symbol.clone()))?;
        let already_realized = position.realized_pnl;
        let closed = position.close(exit_price, reason, Utc::now())?;

        state.positions.remove(symbol);
        state.reservations.remove(symbol);
        state.realized_pnl =
            state.realized_pnl.saturating_add(closed.realized_pnl - already_realized);
        state.record_closed(closed.clone(), self.closed_history);

        info!(
            %symbol,
            position_id = %closed.position.id,
            %exit_price,
            realized_pnl = %closed.realized_pnl,
            reason = %closed.exit_reason,
            "Position closed"
        );
        Ok(closed)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn position(&self, symbol: &Symbol) -> LedgerResult<Option<Position>> {
        Ok(self.read()?.positions.get(symbol).cloned())
    }

    pub fn positions(&self) -> LedgerResult<Vec<Position>> {
        let mut positions: Vec<Position> = self.read()?.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    pub fn reservation(&self, symbol: &Symbol) -> LedgerResult<Option<Reservation>> {
        Ok(self.read()?.reservations.get(symbol).copied())
    }

    /// Most recent closed positions, oldest first.
    pub fn closed_positions(&self) -> LedgerResult<Vec<ClosedPosition>> {
        Ok(self.read()?.closed.iter().cloned().collect())
    }

    pub fn snapshot(&self) -> LedgerResult<LedgerSnapshot> {
        Ok(self.read()?.snapshot())
    }

    /// Status report over all open positions.
    pub fn summary(&self) -> LedgerResult<LedgerSummary> {
        let state = self.read()?;

        let mut positions: Vec<PositionSummary> =
            state.positions.values().map(PositionSummary::from).collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        let total_invested = state.invested();
        let total_pnl = state
            .positions
            .values()
            .fold(Decimal::ZERO, |sum, p| sum.saturating_add(p.current_pnl));
        let pnl_pct = total_pnl
            .checked_div(total_invested)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO);

        Ok(LedgerSummary {
            total_capital: state.total_capital,
            positions_count: state.positions.len(),
            pending_orders: state.reservations.len(),
            total_invested,
            reserved: state.reserved(),
            total_pnl,
            pnl_pct,
            realized_pnl: state.realized_pnl,
            closed_count: state.closed_count,
            positions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakout_domain::DomainError;
    use breakout_engine::RiskRejection;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn symbol(pair: &str) -> Symbol {
        Symbol::from_pair(pair).unwrap()
    }

    fn params(max_positions: usize, fraction: Decimal) -> StrategyParameters {
        StrategyParameters::new(3, dec!(2), dec!(1.5), fraction, dec!(2), dec!(3), max_positions).unwrap()
    }

    fn fill(price: Decimal, quantity: Decimal) -> Fill {
        Fill::new(Price::new(price).unwrap(), Quantity::new(quantity).unwrap(), Utc::now())
    }

    fn capital(total: Decimal) -> CapitalSnapshot {
        CapitalSnapshot::new(total, dec!(0))
    }

    #[test]
    fn test_reserve_then_open() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000));
        let btc = symbol("BTCUSDT");

        ledger.reserve_entry(&btc, dec!(1000), &capital(dec!(10000))).unwrap();
        let snapshot = ledger.snapshot().unwrap();
        assert_eq!(snapshot.reserved, dec!(1000));
        assert_eq!(snapshot.open_positions(), 1);

        let position = ledger.open_position(&btc, &fill(dec!(100), dec!(10))).unwrap();
        assert_eq!(position.total_invested, dec!(1000));
        assert_eq!(position.stop_loss_price.as_decimal(), dec!(97));

        let snapshot = ledger.snapshot().unwrap();
        assert_eq!(snapshot.reserved, dec!(0));
        assert_eq!(snapshot.invested, dec!(1000));
        assert_eq!(snapshot.open_positions(), 1);
        assert!(ledger.reservation(&btc).unwrap().is_none());
    }

    #[test]
    fn test_release_restores_headroom() {
        let ledger = PositionLedger::new(params(1, dec!(10)), dec!(10000));
        let btc = symbol("BTCUSDT");
        let eth = symbol("ETHUSDT");

        ledger.reserve_entry(&btc, dec!(1000), &capital(dec!(10000))).unwrap();
        let blocked = ledger.reserve_entry(&eth, dec!(1000), &capital(dec!(10000)));
        assert_eq!(
            blocked,
            Err(LedgerError::RiskRejected(RiskRejection::MaxPositions { open: 1, max: 1 }))
        );

        assert!(ledger.release(&btc).unwrap().is_some());
        assert!(ledger.reserve_entry(&eth, dec!(1000), &capital(dec!(10000))).is_ok());
    }

    #[test]
    fn test_reserve_rejects_duplicate_and_pending() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000));
        let btc = symbol("BTCUSDT");

        ledger.reserve_entry(&btc, dec!(500), &capital(dec!(10000))).unwrap();
        assert_eq!(
            ledger.reserve_entry(&btc, dec!(500), &capital(dec!(10000))),
            Err(LedgerError::PendingOrder(btc.clone()))
        );

        ledger.open_position(&btc, &fill(dec!(100), dec!(5))).unwrap();
        assert_eq!(
            ledger.reserve_entry(&btc, dec!(500), &capital(dec!(10000))),
            Err(LedgerError::DuplicatePosition(btc.clone()))
        );
        assert_eq!(
            ledger.open_position(&btc, &fill(dec!(100), dec!(5))),
            Err(LedgerError::DuplicatePosition(btc))
        );
    }

    #[test]
    fn test_exchange_committed_capital_is_respected() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000));
        let btc = symbol("BTCUSDT");

        let busy = CapitalSnapshot::new(dec!(10000), dec!(9500));
        let result = ledger.reserve_entry(&btc, dec!(1000), &busy);
        assert!(matches!(
            result,
            Err(LedgerError::RiskRejected(RiskRejection::InsufficientCapital { .. }))
        ));
    }

    #[test]
    fn test_add_on_flow() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000));
        let btc = symbol("BTCUSDT");

        assert_eq!(
            ledger.reserve_add(&btc, dec!(100), &capital(dec!(10000))),
            Err(LedgerError::NoSuchPosition(btc.clone()))
        );

        ledger.open_position(&btc, &fill(dec!(100), dec!(5))).unwrap();
        ledger.reserve_add(&btc, dec!(515), &capital(dec!(10000))).unwrap();
        let position = ledger.apply_add_on(&btc, &fill(dec!(103), dec!(5))).unwrap();

        assert_eq!(position.add_on_count, 1);
        assert_eq!(position.quantity.as_decimal(), dec!(10));
        assert_eq!(position.total_invested, dec!(1015));
        assert_eq!(position.entry_price.as_decimal(), dec!(101.5));
        assert_eq!(position.add_on_reference.as_decimal(), dec!(103));
        assert_eq!(ledger.snapshot().unwrap().reserved, dec!(0));
    }

    #[test]
    fn test_mark_to_market_and_close() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000));
        let btc = symbol("BTCUSDT");
        ledger.open_position(&btc, &fill(dec!(100), dec!(2))).unwrap();

        let position = ledger.mark_to_market(&btc, Price::new(dec!(110)).unwrap()).unwrap();
        assert_eq!(position.highest_price.as_decimal(), dec!(110));
        assert_eq!(position.stop_loss_price.as_decimal(), dec!(106.7));

        let position = ledger.mark_to_market(&btc, Price::new(dec!(106.5)).unwrap()).unwrap();
        assert_eq!(position.highest_price.as_decimal(), dec!(110));
        assert_eq!(position.current_pnl, dec!(13));

        let reason = ExitReason::TrailingStop {
            peak: position.highest_price,
            drawdown_pct: dec!(3.18),
        };
        let closed = ledger.close_position(&btc, Price::new(dec!(106.5)).unwrap(), reason).unwrap();
        assert_eq!(closed.realized_pnl, dec!(13));

        assert!(ledger.position(&btc).unwrap().is_none());
        let summary = ledger.summary().unwrap();
        assert_eq!(summary.positions_count, 0);
        assert_eq!(summary.closed_count, 1);
        assert_eq!(summary.realized_pnl, dec!(13));
        assert_eq!(
            ledger.close_position(&btc, Price::new(dec!(100)).unwrap(), reason),
            Err(LedgerError::NoSuchPosition(btc))
        );
    }

    #[test]
    fn test_partial_exit_keeps_position_open() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000));
        let btc = symbol("BTCUSDT");
        ledger.open_position(&btc, &fill(dec!(100), dec!(4))).unwrap();

        let position = ledger
            .reduce_position(&btc, Quantity::new(dec!(1)).unwrap(), Price::new(dec!(98)).unwrap())
            .unwrap();
        assert_eq!(position.quantity.as_decimal(), dec!(3));
        assert_eq!(ledger.snapshot().unwrap().invested, dec!(300));
        assert_eq!(ledger.summary().unwrap().realized_pnl, dec!(-2));
    }

    #[test]
    fn test_fill_exceeding_capital_is_refused() {
        let ledger = PositionLedger::new(params(3, dec!(100)), dec!(1000));
        let btc = symbol("BTCUSDT");

        let result = ledger.open_position(&btc, &fill(dec!(100), dec!(11)));
        assert!(matches!(result, Err(LedgerError::CapitalExceeded { .. })));
        assert!(ledger.position(&btc).unwrap().is_none());
    }

    #[test]
    fn test_refused_fill_keeps_reservation() {
        let ledger = PositionLedger::new(params(3, dec!(50)), dec!(1000));
        let btc = symbol("BTCUSDT");
        let eth = symbol("ETHUSDT");

        ledger.reserve_entry(&btc, dec!(500), &capital(dec!(1000))).unwrap();
        ledger.open_position(&btc, &fill(dec!(100), dec!(5))).unwrap();
        ledger.reserve_entry(&eth, dec!(500), &capital(dec!(1000))).unwrap();

        // Filled one percent above the reserved price
        let result = ledger.open_position(&eth, &fill(dec!(101), dec!(5)));
        assert_eq!(
            result,
            Err(LedgerError::CapitalExceeded {
                symbol: eth.clone(),
                committed: dec!(500),
                cost: dec!(505),
                total: dec!(1000),
            })
        );

        let reservation = ledger.reservation(&eth).unwrap().unwrap();
        assert_eq!(reservation.kind, ReservationKind::Entry);
        assert_eq!(reservation.notional, dec!(500));
        assert!(ledger.position(&eth).unwrap().is_none());
        assert_eq!(ledger.snapshot().unwrap().committed(), dec!(1000));

        // The fill at the reserved price still fits
        ledger.open_position(&eth, &fill(dec!(100), dec!(5))).unwrap();
        assert!(ledger.reservation(&eth).unwrap().is_none());
    }

    #[test]
    fn test_refused_add_on_fill_keeps_position_and_reservation() {
        let ledger = PositionLedger::new(params(3, dec!(50)), dec!(1000));
        let btc = symbol("BTCUSDT");
        ledger.open_position(&btc, &fill(dec!(100), dec!(5))).unwrap();
        ledger.reserve_add(&btc, dec!(500), &capital(dec!(1000))).unwrap();
        let before = ledger.position(&btc).unwrap().unwrap();

        let result = ledger.apply_add_on(&btc, &fill(dec!(110), dec!(5)));

        assert!(matches!(result, Err(LedgerError::CapitalExceeded { .. })));
        assert_eq!(ledger.position(&btc).unwrap().unwrap(), before);
        assert!(ledger.reservation(&btc).unwrap().is_some());
    }

    #[test]
    fn test_add_on_refused_by_risk_leaves_ledger_unchanged() {
        // Q = 100%: the entry commits everything
        let ledger = PositionLedger::new(params(3, dec!(100)), dec!(1000));
        let btc = symbol("BTCUSDT");
        ledger.reserve_entry(&btc, dec!(1000), &capital(dec!(1000))).unwrap();
        ledger.open_position(&btc, &fill(dec!(100), dec!(10))).unwrap();
        let before = ledger.snapshot().unwrap();

        let result = ledger.reserve_add(&btc, dec!(1000), &capital(dec!(1000)));
        assert!(matches!(
            result,
            Err(LedgerError::RiskRejected(RiskRejection::CapitalFullyCommitted { .. }))
        ));

        // Headroom smaller than the order
        ledger.mark_to_market(&btc, Price::new(dec!(103)).unwrap()).unwrap();
        let partly = CapitalSnapshot::new(dec!(1500), dec!(0));
        let result = ledger.reserve_add(&btc, dec!(600), &partly);
        assert!(matches!(
            result,
            Err(LedgerError::RiskRejected(RiskRejection::InsufficientCapital { .. }))
        ));

        assert!(ledger.reservation(&btc).unwrap().is_none());
        let after = ledger.snapshot().unwrap();
        assert_eq!(after.invested, before.invested);
        assert_eq!(after.reserved, dec!(0));
        assert_eq!(ledger.position(&btc).unwrap().unwrap().add_on_count, 0);
    }

    #[test]
    fn test_overflowing_mark_to_market_keeps_ledger_usable() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000));
        let btc = symbol("BTCUSDT");
        let eth = symbol("ETHUSDT");
        ledger.open_position(&btc, &fill(dec!(100), dec!(10))).unwrap();
        let before = ledger.position(&btc).unwrap().unwrap();

        let result = ledger.mark_to_market(&btc, Price::new(Decimal::MAX / dec!(2)).unwrap());
        assert!(matches!(result, Err(LedgerError::Domain(DomainError::Overflow(_)))));

        // No poisoned lock, no partial update
        assert_eq!(ledger.position(&btc).unwrap().unwrap(), before);
        assert!(ledger.snapshot().is_ok());
        ledger.reserve_entry(&eth, dec!(1000), &capital(dec!(10000))).unwrap();
        let position = ledger.mark_to_market(&btc, Price::new(dec!(105)).unwrap()).unwrap();
        assert_eq!(position.current_pnl, dec!(50));
    }

    #[test]
    fn test_unrepresentable_fill_cost_is_refused() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000));
        let btc = symbol("BTCUSDT");

        let result = ledger.open_position(&btc, &fill(Decimal::MAX, dec!(2)));
        assert!(matches!(result, Err(LedgerError::Domain(DomainError::Overflow(_)))));
        assert!(ledger.summary().is_ok());
    }

    #[test]
    fn test_closed_history_is_bounded() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000)).with_closed_history(2);
        let btc = symbol("BTCUSDT");
        let reason = ExitReason::TrailingStop {
            peak: Price::new(dec!(100)).unwrap(),
            drawdown_pct: dec!(3),
        };

        for exit in [dec!(97), dec!(98), dec!(99)] {
            ledger.open_position(&btc, &fill(dec!(100), dec!(1))).unwrap();
            ledger.close_position(&btc, Price::new(exit).unwrap(), reason).unwrap();
        }

        let closed = ledger.closed_positions().unwrap();
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].exit_price.as_decimal(), dec!(98));
        assert_eq!(closed[1].exit_price.as_decimal(), dec!(99));

        let summary = ledger.summary().unwrap();
        assert_eq!(summary.closed_count, 3);
        assert_eq!(summary.realized_pnl, dec!(-6));
    }

    #[test]
    fn test_summary_totals() {
        let ledger = PositionLedger::new(params(3, dec!(10)), dec!(10000));
        ledger.open_position(&symbol("BTCUSDT"), &fill(dec!(100), dec!(5))).unwrap();
        ledger.open_position(&symbol("ETHUSDT"), &fill(dec!(50), dec!(10))).unwrap();
        ledger.mark_to_market(&symbol("BTCUSDT"), Price::new(dec!(110)).unwrap()).unwrap();
        ledger.mark_to_market(&symbol("ETHUSDT"), Price::new(dec!(45)).unwrap()).unwrap();

        let summary = ledger.summary().unwrap();
        assert_eq!(summary.positions_count, 2);
        assert_eq!(summary.total_invested, dec!(1000));
        assert_eq!(summary.total_pnl, dec!(0));
        assert_eq!(summary.positions[0].symbol, symbol("BTCUSDT"));
        assert_eq!(summary.positions[0].pnl_pct, dec!(10));
    }

    #[test]
    fn test_concurrent_entries_respect_max_positions() {
        let ledger = Arc::new(PositionLedger::new(params(3, dec!(10)), dec!(10000)));
        let pairs = ["BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT", "DOTUSDT", "LTCUSDT"];

        let handles: Vec<_> = pairs
            .iter()
            .map(|pair| {
                let ledger = Arc::clone(&ledger);
                let symbol = symbol(pair);
                std::thread::spawn(move || {
                    ledger.reserve_entry(&symbol, dec!(1000), &capital(dec!(10000))).is_ok()
                })
            })
            .collect();

        let approved = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(approved, 3);

        let snapshot = ledger.snapshot().unwrap();
        assert_eq!(snapshot.open_positions(), 3);
        assert_eq!(snapshot.reserved, dec!(3000));
    }

    #[test]
    fn test_concurrent_entries_never_overcommit_capital() {
        // Q = 40% of 1000, any max positions: only two 400 reservations fit
        let ledger = Arc::new(PositionLedger::new(params(20, dec!(40)), dec!(1000)));
        let pairs = ["BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT"];

        let handles: Vec<_> = pairs
            .iter()
            .map(|pair| {
                let ledger = Arc::clone(&ledger);
                let symbol = symbol(pair);
                std::thread::spawn(move || {
                    ledger.reserve_entry(&symbol, dec!(400), &capital(dec!(1000))).is_ok()
                })
            })
            .collect();

        let approved = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(approved, 2);
        assert!(ledger.snapshot().unwrap().committed() <= dec!(1000));
    }
}
