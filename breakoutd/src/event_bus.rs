//! Event bus for internal daemon communication.
//!
//! Symbol workers publish what they observe and do: detected signals,
//! fills, missed signals, position changes and state transitions. The
//! daemon loop logs them; tests subscribe to wait on them.
//!
//! Uses tokio broadcast channels for fan-out to multiple receivers.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use breakout_domain::{ClosedPosition, Position, Price, Quantity, Symbol};
use breakout_engine::Signal;
use breakout_exec::OrderKind;

use crate::worker::SymbolState;

// =============================================================================
// Event Types
// =============================================================================

/// Events that flow through the daemon event bus.
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    /// Detector returned an actionable signal
    SignalDetected {
        symbol: Symbol,
        signal: Signal,
        candle_time: DateTime<Utc>,
    },

    /// Order was (at least partially) filled
    OrderFilled(OrderFill),

    /// Signal fired but no order filled: risk rejection, sizing failure,
    /// exchange rejection or exchange error
    MissedSignal {
        symbol: Symbol,
        kind: OrderKind,
        reason: String,
    },

    /// Entry fill created a position
    PositionOpened(Position),

    /// Add-on fill grew a position
    PositionAdded(Position),

    /// Partial exit fill shrank a position
    PositionReduced(Position),

    /// Exit fill closed a position
    PositionClosed(ClosedPosition),

    /// Candle dropped for a non-increasing timestamp
    StaleCandle {
        symbol: Symbol,
        last: DateTime<Utc>,
        received: DateTime<Utc>,
    },

    /// Symbol moved between lifecycle states
    SymbolStateChanged {
        symbol: Symbol,
        previous: SymbolState,
        new: SymbolState,
        timestamp: DateTime<Utc>,
    },

    /// Shutdown signal
    Shutdown,
}

/// Order fill notification.
#[derive(Debug, Clone)]
pub struct OrderFill {
    pub symbol: Symbol,
    /// Client order id of the filled order
    pub order_id: Uuid,
    pub kind: OrderKind,
    pub fill_price: Price,
    pub filled_quantity: Quantity,
    pub filled_at: DateTime<Utc>,
}

// =============================================================================
// Event Bus
// =============================================================================

/// Event bus for daemon-wide communication.
///
/// Multiple producers can send events, and multiple consumers can receive.
/// Uses broadcast channels for fan-out pattern.
pub struct EventBus {
    sender: broadcast::Sender<DaemonEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before
    /// slow receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event, 0 when
    /// nobody is listening.
    pub fn send(&self, event: DaemonEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Receiver for daemon events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<DaemonEvent>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns error description if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<Result<DaemonEvent, String>> {
        match self.receiver.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }

    /// Try to receive an event without blocking.
    ///
    /// Returns `None` if no event is immediately available.
    pub fn try_recv(&mut self) -> Option<Result<DaemonEvent, String>> {
        match self.receiver.try_recv() {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn missed(pair: &str) -> DaemonEvent {
        DaemonEvent::MissedSignal {
            symbol: Symbol::from_pair(pair).unwrap(),
            kind: OrderKind::Entry,
            reason: "risk rejected".to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_send_recv() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.send(missed("BTCUSDT"));

        let event = receiver.recv().await.unwrap().unwrap();
        match event {
            DaemonEvent::MissedSignal { symbol, kind, .. } => {
                assert_eq!(symbol.as_pair(), "BTCUSDT");
                assert_eq!(kind, OrderKind::Entry);
            },
            _ => panic!("Expected MissedSignal event"),
        }
    }

    #[tokio::test]
    async fn test_event_bus_multiple_receivers() {
        let bus = EventBus::new(10);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();

        assert_eq!(bus.receiver_count(), 2);
        assert_eq!(bus.send(DaemonEvent::Shutdown), 2);

        assert!(matches!(receiver1.recv().await, Some(Ok(DaemonEvent::Shutdown))));
        assert!(matches!(receiver2.recv().await, Some(Ok(DaemonEvent::Shutdown))));
    }

    #[tokio::test]
    async fn test_event_bus_no_receivers() {
        let bus = EventBus::new(10);
        assert_eq!(bus.send(DaemonEvent::Shutdown), 0);
    }

    #[tokio::test]
    async fn test_event_bus_lagged_receiver() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();

        for pair in ["BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT"] {
            bus.send(missed(pair));
        }

        assert!(matches!(receiver.try_recv(), Some(Err(_))));
        assert!(matches!(receiver.try_recv(), Some(Ok(DaemonEvent::MissedSignal { .. }))));
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();
        assert!(receiver.try_recv().is_none());
    }
}
