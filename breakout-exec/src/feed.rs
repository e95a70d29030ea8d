//! Candle sources.
//!
//! Workers consume candles through [`CandleSource`] and never see the
//! transport. Two shapes are provided:
//!
//! - push: a [`CandleFeed`] hub routes published candles to one bounded
//!   channel per symbol, read by a [`StreamingCandleSource`]
//! - pull: a [`PollingCandleSource`] asks a [`CandlePoller`] for the latest
//!   candle on a fixed interval and yields only candles it has not seen

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use breakout_domain::{Candle, Symbol};

use crate::error::{ExecError, ExecResult};

/// Per-symbol stream of candles.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Wait for the next candle. `None` means the source is finished.
    async fn next_candle(&mut self) -> Option<Candle>;
}

// =============================================================================
// Push model
// =============================================================================

/// Reads candles pushed through a [`CandleFeed`].
pub struct StreamingCandleSource {
    symbol: Symbol,
    receiver: mpsc::Receiver<Candle>,
}

impl StreamingCandleSource {
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }
}

#[async_trait]
impl CandleSource for StreamingCandleSource {
    async fn next_candle(&mut self) -> Option<Candle> {
        self.receiver.recv().await
    }
}

/// Routes published candles to the subscriber of their symbol.
pub struct CandleFeed {
    capacity: usize,
    subscribers: RwLock<HashMap<Symbol, mpsc::Sender<Candle>>>,
}

impl CandleFeed {
    /// Create a feed whose per-symbol channels hold `capacity` candles.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Open a source for `symbol`, replacing any earlier subscriber.
    pub fn subscribe(&self, symbol: &Symbol) -> ExecResult<StreamingCandleSource> {
        let (tx, rx) = mpsc::channel(self.capacity);

        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|e| ExecError::Feed(format!("Failed to acquire subscription lock: {}", e)))?;
        subscribers.insert(symbol.clone(), tx);

        Ok(StreamingCandleSource {
            symbol: symbol.clone(),
            receiver: rx,
        })
    }

    /// Close the source for `symbol`; its worker sees the end of the stream.
    pub fn unsubscribe(&self, symbol: &Symbol) -> ExecResult<()> {
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|e| ExecError::Feed(format!("Failed to acquire subscription lock: {}", e)))?;
        subscribers.remove(symbol);
        Ok(())
    }

    /// Deliver a candle to its symbol's subscriber.
    ///
    /// Waits while the subscriber's channel is full.
    ///
    /// # Errors
    /// `ExecError::Feed` when nobody is subscribed to the candle's symbol or
    /// the subscriber has gone away.
    pub async fn publish(&self, candle: Candle) -> ExecResult<()> {
        let sender = {
            let subscribers = self
                .subscribers
                .read()
                .map_err(|e| ExecError::Feed(format!("Failed to acquire subscription lock: {}", e)))?;
            subscribers.get(&candle.symbol).cloned()
        };

        let Some(sender) = sender else {
            return Err(ExecError::Feed(format!("No subscriber for {}", candle.symbol)));
        };

        let symbol = candle.symbol.clone();
        if sender.send(candle).await.is_err() {
            self.unsubscribe(&symbol)?;
            return Err(ExecError::Feed(format!("Subscriber for {} has gone away", symbol)));
        }
        Ok(())
    }

    pub fn subscribed_symbols(&self) -> Vec<Symbol> {
        match self.subscribers.read() {
            Ok(subscribers) => subscribers.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for CandleFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

// =============================================================================
// Pull model
// =============================================================================

/// Something that can be asked for the latest candle of a symbol.
#[async_trait]
pub trait CandlePoller: Send + Sync {
    /// Latest complete candle, or `None` if there is none yet.
    async fn latest_candle(&self, symbol: &Symbol) -> Result<Option<Candle>, ExecError>;
}

/// Polls a [`CandlePoller`] on a fixed interval.
pub struct PollingCandleSource<P: CandlePoller> {
    poller: Arc<P>,
    symbol: Symbol,
    ticker: Interval,
    last_seen: Option<DateTime<Utc>>,
}

impl<P: CandlePoller> PollingCandleSource<P> {
    /// Must be called inside a tokio runtime.
    pub fn new(poller: Arc<P>, symbol: Symbol, period: Duration) -> Self {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            poller,
            symbol,
            ticker,
            last_seen: None,
        }
    }
}

#[async_trait]
impl<P: CandlePoller + 'static> CandleSource for PollingCandleSource<P> {
    async fn next_candle(&mut self) -> Option<Candle> {
        loop {
            self.ticker.tick().await;

            match self.poller.latest_candle(&self.symbol).await {
                Ok(Some(candle)) => {
                    if self.last_seen.is_some_and(|seen| candle.timestamp <= seen) {
                        continue;
                    }
                    self.last_seen = Some(candle.timestamp);
                    return Some(candle);
                },
                Ok(None) => {
                    debug!(symbol = %self.symbol, "No candle available yet");
                },
                Err(ExecError::FeedClosed(reason)) => {
                    warn!(symbol = %self.symbol, %reason, "Candle poller closed");
                    return None;
                },
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "Candle poll failed");
                },
            }
        }
    }
}
