use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// One OHLCV observation.
///
/// The timestamp is optional so synthetic series can be built from plain prices;
/// trades recorded on such candles simply carry no time.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    timestamp: Option<DateTime<Utc>>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: Option<f64>,
}

impl From<(f64, f64, f64, f64)> for Candle {
    fn from((open, high, low, close): (f64, f64, f64, f64)) -> Self {
        Self {
            timestamp: None,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }
}

impl From<(f64, f64, f64, f64, f64)> for Candle {
    fn from((open, high, low, close, volume): (f64, f64, f64, f64, f64)) -> Self {
        Self {
            timestamp: None,
            open,
            high,
            low,
            close,
            volume: Some(volume),
        }
    }
}

impl From<(DateTime<Utc>, f64, f64, f64, f64, f64)> for Candle {
    fn from((timestamp, open, high, low, close, volume): (DateTime<Utc>, f64, f64, f64, f64, f64)) -> Self {
        Self {
            timestamp: Some(timestamp),
            open,
            high,
            low,
            close,
            volume: Some(volume),
        }
    }
}

impl Candle {
    /// Returns the candle timestamp, if any.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Returns the opening price.
    pub fn open(&self) -> f64 {
        self.open
    }

    /// Returns the highest price.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Returns the lowest price.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Returns the closing price.
    pub fn close(&self) -> f64 {
        self.close
    }

    /// Returns the traded volume, if known.
    pub fn volume(&self) -> Option<f64> {
        self.volume
    }
}

/// Validated construction of a [`Candle`].
///
/// ### Example
/// ```rust
/// use candlebt::prelude::*;
///
/// let candle = CandleBuilder::builder()
///     .open(100.0)
///     .high(110.0)
///     .low(95.0)
///     .close(105.0)
///     .volume(1.0)
///     .build()
///     .unwrap();
/// assert_eq!(candle.close(), 105.0);
/// ```
#[derive(Debug, Default)]
pub struct CandleBuilder {
    timestamp: Option<DateTime<Utc>>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

impl CandleBuilder {
    /// Starts an empty builder.
    pub fn builder() -> Self {
        Self::default()
    }

    /// Sets the timestamp.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the opening price.
    pub fn open(mut self, open: f64) -> Self {
        self.open = Some(open);
        self
    }

    /// Sets the highest price.
    pub fn high(mut self, high: f64) -> Self {
        self.high = Some(high);
        self
    }

    /// Sets the lowest price.
    pub fn low(mut self, low: f64) -> Self {
        self.low = Some(low);
        self
    }

    /// Sets the closing price.
    pub fn close(mut self, close: f64) -> Self {
        self.close = Some(close);
        self
    }

    /// Sets the volume.
    pub fn volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Builds the candle, checking that every price is finite and that
    /// `low <= open, close <= high`.
    pub fn build(self) -> Result<Candle> {
        let open = self.open.ok_or_else(|| Error::InvalidCandle("missing open".into()))?;
        let high = self.high.ok_or_else(|| Error::InvalidCandle("missing high".into()))?;
        let low = self.low.ok_or_else(|| Error::InvalidCandle("missing low".into()))?;
        let close = self.close.ok_or_else(|| Error::InvalidCandle("missing close".into()))?;

        if [open, high, low, close].iter().any(|p| !p.is_finite()) {
            return Err(Error::InvalidCandle(format!(
                "non-finite price in ({open}, {high}, {low}, {close})"
            )));
        }
        if low > open.min(close) || high < open.max(close) {
            return Err(Error::InvalidCandle(format!(
                "prices out of range: open {open}, high {high}, low {low}, close {close}"
            )));
        }
        if let Some(volume) = self.volume
            && (!volume.is_finite() || volume < 0.0)
        {
            return Err(Error::InvalidCandle(format!("invalid volume {volume}")));
        }

        Ok(Candle {
            timestamp: self.timestamp,
            open,
            high,
            low,
            close,
            volume: self.volume,
        })
    }
}

#[cfg(test)]
#[test]
fn build_valid_candle() {
    let candle = CandleBuilder::builder()
        .open(90.0)
        .high(110.0)
        .low(80.0)
        .close(100.0)
        .timestamp(DateTime::from_timestamp(1515151515, 0).unwrap())
        .build()
        .unwrap();

    assert_eq!(candle.open(), 90.0);
    assert_eq!(candle.high(), 110.0);
    assert_eq!(candle.low(), 80.0);
    assert_eq!(candle.close(), 100.0);
    assert!(candle.volume().is_none());
    assert!(candle.timestamp().is_some());
}

#[cfg(test)]
#[test]
fn build_rejects_missing_price() {
    let result = CandleBuilder::builder().open(90.0).high(110.0).low(80.0).build();
    assert!(matches!(result, Err(Error::InvalidCandle(_))));
}

#[cfg(test)]
#[test]
fn build_rejects_inverted_range() {
    let result = CandleBuilder::builder()
        .open(90.0)
        .high(95.0)
        .low(80.0)
        .close(100.0)
        .build();
    assert!(matches!(result, Err(Error::InvalidCandle(_))));

    let result = CandleBuilder::builder()
        .open(f64::NAN)
        .high(95.0)
        .low(80.0)
        .close(90.0)
        .build();
    assert!(matches!(result, Err(Error::InvalidCandle(_))));
}

#[cfg(test)]
#[test]
fn from_tuples() {
    let candle = Candle::from((18.0, 19.5, 15.0, 19.5));
    assert!(candle.timestamp().is_none());
    assert!(candle.volume().is_none());

    let candle = Candle::from((18.0, 19.5, 15.0, 19.5, 1200.0));
    assert_eq!(candle.volume(), Some(1200.0));
}
