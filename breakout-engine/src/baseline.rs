//! Rolling volume baseline.
//!
//! Fixed-capacity window of the last R candle volumes with a running sum.
//! Decimal arithmetic keeps the running sum exact, so the average never
//! drifts from a fresh recomputation.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use breakout_domain::Candle;

use crate::error::{EngineError, EngineResult};

/// Rolling mean of candle volume over the last `window` candles.
#[derive(Debug, Clone)]
pub struct VolumeBaseline {
    window: usize,
    volumes: VecDeque<Decimal>,
    sum: Decimal,
    last_timestamp: Option<DateTime<Utc>>,
}

impl VolumeBaseline {
    /// Create an empty baseline. A window of zero is treated as one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            volumes: VecDeque::with_capacity(window),
            sum: Decimal::ZERO,
            last_timestamp: None,
        }
    }

    /// Admit a candle's volume, evicting the oldest sample when full.
    ///
    /// # Errors
    /// `EngineError::StaleOrOutOfOrderCandle` when the candle is not newer
    /// than the last admitted one, `EngineError::VolumeOverflow` when the
    /// running sum cannot hold the volume. The window is left untouched.
    pub fn update(&mut self, candle: &Candle) -> EngineResult<()> {
        if let Some(last) = self.last_timestamp {
            if candle.timestamp <= last {
                return Err(EngineError::StaleOrOutOfOrderCandle {
                    symbol: candle.symbol.clone(),
                    last,
                    received: candle.timestamp,
                });
            }
        }

        let full = self.volumes.len() == self.window;
        let retained = match self.volumes.front() {
            Some(oldest) if full => self.sum - *oldest,
            _ => self.sum,
        };
        let sum = retained.checked_add(candle.volume).ok_or_else(|| {
            EngineError::VolumeOverflow {
                symbol: candle.symbol.clone(),
                volume: candle.volume,
            }
        })?;

        if full {
            self.volumes.pop_front();
        }
        self.volumes.push_back(candle.volume);
        self.sum = sum;
        self.last_timestamp = Some(candle.timestamp);

        Ok(())
    }

    /// Mean volume of the window.
    ///
    /// # Errors
    /// `EngineError::InsufficientData` until `window` candles have been admitted.
    pub fn average(&self) -> EngineResult<Decimal> {
        if !self.is_warm() {
            return Err(EngineError::InsufficientData {
                have: self.volumes.len(),
                need: self.window,
            });
        }
        Ok(self.sum / Decimal::from(self.volumes.len()))
    }

    /// Whether a full window has been observed.
    pub fn is_warm(&self) -> bool {
        self.volumes.len() == self.window
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp
    }
}
