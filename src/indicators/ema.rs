use super::{Indicator, closes};
use crate::engine::Candle;
use crate::errors::{Error, Result};

/// Exponential moving average of the close, `alpha = 2 / (period + 1)`.
///
/// Seeded with the simple average of the first `period` closes, so the
/// warm-up is `period - 1` candles.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    values: Vec<f64>,
}

impl Ema {
    /// Creates an average over `period` candles (at least one).
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

impl Indicator for Ema {
    fn prepare(&mut self, candles: &[Candle]) {
        let closes = closes(candles).collect::<Vec<_>>();
        let mut values = vec![f64::NAN; closes.len()];
        if closes.len() < self.period {
            self.values = values;
            return;
        }

        let alpha = 2.0 / (self.period as f64 + 1.0);
        let mut ema = closes[..self.period].iter().sum::<f64>() / self.period as f64;
        values[self.period - 1] = ema;
        for i in self.period..closes.len() {
            ema = alpha * closes[i] + (1.0 - alpha) * ema;
            values[i] = ema;
        }
        self.values = values;
    }

    fn values(&self) -> &[f64] {
        &self.values
    }

    fn warmup_length(&self) -> usize {
        self.period - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles};

    #[test]
    fn ema_3_known_values() {
        // alpha = 0.5, seed SMA(10, 11, 12) = 11
        let mut ema = Ema::new(3).unwrap();
        ema.prepare(&make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]));

        let values = ema.values();
        assert!(values[1].is_nan());
        assert_approx(values[2], 11.0, 1e-10);
        assert_approx(values[3], 12.0, 1e-10);
        assert_approx(values[4], 13.0, 1e-10);
    }

    #[test]
    fn ema_period_1_equals_close() {
        let mut ema = Ema::new(1).unwrap();
        ema.prepare(&make_candles(&[100.0, 200.0, 300.0]));
        assert_eq!(ema.values(), &[100.0, 200.0, 300.0]);
        assert_eq!(ema.warmup_length(), 0);
    }
}
