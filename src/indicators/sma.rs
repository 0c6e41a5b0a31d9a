use super::{Indicator, closes};
use crate::engine::Candle;
use crate::errors::{Error, Result};

/// Simple moving average of the close.
///
/// Warm-up: `period - 1` candles.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    values: Vec<f64>,
}

impl Sma {
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

impl Indicator for Sma {
    fn prepare(&mut self, candles: &[Candle]) {
        let closes = closes(candles).collect::<Vec<_>>();
        let mut values = vec![f64::NAN; closes.len()];

        let mut sum = 0.0;
        for (i, close) in closes.iter().enumerate() {
            sum += close;
            if i >= self.period {
                sum -= closes[i - self.period];
            }
            if i + 1 >= self.period {
                values[i] = sum / self.period as f64;
            }
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
    fn sma_3_known_values() {
        let mut sma = Sma::new(3).unwrap();
        sma.prepare(&make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]));

        let values = sma.values();
        assert!(values[0].is_nan());
        assert!(values[1].is_nan());
        assert_approx(values[2], 11.0, 1e-10);
        assert_approx(values[3], 12.0, 1e-10);
        assert_approx(values[4], 13.0, 1e-10);
        assert_eq!(sma.warmup_length(), 2);
    }

    #[test]
    fn sma_matches_ta() {
        use ta::Next;

        let closes = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03, 45.61, 46.28,
        ];
        let period = 5;
        let mut sma = Sma::new(period).unwrap();
        sma.prepare(&make_candles(&closes));

        let mut reference = ta::indicators::SimpleMovingAverage::new(period).unwrap();
        for (i, close) in closes.iter().enumerate() {
            let expected = reference.next(*close);
            if i + 1 >= period {
                assert_approx(sma.values()[i], expected, 1e-9);
            }
        }
    }

    #[test]
    fn sma_shorter_than_period() {
        let mut sma = Sma::new(10).unwrap();
        sma.prepare(&make_candles(&[1.0, 2.0]));
        assert!(sma.values().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sma_zero_period() {
        assert!(matches!(Sma::new(0), Err(Error::InvalidPeriod(0))));
    }
}
