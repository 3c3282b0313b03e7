use crate::interval::Interval;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("{symbol} {interval}: OHLC out of range (o={open} h={high} l={low} c={close})")]
    OhlcRange {
        symbol: String,
        interval: Interval,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
    #[error("{symbol} {interval}: negative volume {volume}")]
    NegativeVolume {
        symbol: String,
        interval: Interval,
        volume: i64,
    },
    #[error("{symbol} {interval}: timestamp {timestamp} not aligned to interval boundary")]
    Misaligned {
        symbol: String,
        interval: Interval,
        timestamp: i64,
    },
}

/// One OHLCV record. `timestamp` is the window start in epoch
/// milliseconds, aligned to the interval boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub interval: Interval,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn validate(&self) -> Result<(), BarError> {
        if !(self.low <= self.open && self.open <= self.high)
            || !(self.low <= self.close && self.close <= self.high)
        {
            return Err(BarError::OhlcRange {
                symbol: self.symbol.clone(),
                interval: self.interval,
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }
        if self.volume < 0 {
            return Err(BarError::NegativeVolume {
                symbol: self.symbol.clone(),
                interval: self.interval,
                volume: self.volume,
            });
        }
        Ok(())
    }

    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Aggregate a window of finer bars into one bar at `interval`,
/// stamped at `window_start`. Callers are responsible for checking
/// window completeness first; this only folds what it is given.
pub fn aggregate_bars(source: &[Bar], interval: Interval, window_start: i64) -> Option<Bar> {
    let first = source.first()?;
    let last = source.last()?;

    let high = source.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = source.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let volume = source.iter().map(|b| b.volume).sum();

    Some(Bar::new(
        first.symbol.clone(),
        interval,
        window_start,
        first.open,
        high,
        low,
        last.close,
        volume,
    ))
}
