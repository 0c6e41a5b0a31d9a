use super::{Indicator, closes};
use crate::engine::Candle;
use crate::errors::{Error, Result};

/// Relative strength index with Wilder smoothing.
///
/// `RSI = 100 - 100 / (1 + avg_gain / avg_loss)`, seeded with plain averages
/// over the first `period` changes. Warm-up: `period` candles.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    values: Vec<f64>,
}

impl Rsi {
    /// Creates an RSI over `period` changes (at least one).
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(Error::InvalidPeriod(period));
        }
        Ok(Self {
            period,
            values: Vec::new(),
        })
    }

    /// Returns the period.
    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Rsi {
    fn prepare(&mut self, candles: &[Candle]) {
        let closes = closes(candles).collect::<Vec<_>>();
        let mut values = vec![f64::NAN; closes.len()];
        if closes.len() <= self.period {
            self.values = values;
            return;
        }

        let changes = closes.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>();
        let period = self.period as f64;

        let (mut avg_gain, mut avg_loss) = changes[..self.period]
            .iter()
            .fold((0.0, 0.0), |(gain, loss), change| (gain + change.max(0.0), loss + (-change).max(0.0)));
        avg_gain /= period;
        avg_loss /= period;
        values[self.period] = rsi(avg_gain, avg_loss);

        for (i, change) in changes.iter().enumerate().skip(self.period) {
            avg_gain = (avg_gain * (period - 1.0) + change.max(0.0)) / period;
            avg_loss = (avg_loss * (period - 1.0) + (-change).max(0.0)) / period;
            values[i + 1] = rsi(avg_gain, avg_loss);
        }
        self.values = values;
    }

    fn values(&self) -> &[f64] {
        &self.values
    }

    fn warmup_length(&self) -> usize {
        self.period
    }
}

fn rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
