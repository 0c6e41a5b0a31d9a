//! Technical indicators over close prices.
//!
//! An indicator is computed once for the whole series before the run starts
//! (see [`Strategy::indicators`](crate::strategy::Strategy::indicators)).
//! Leading entries that cannot be computed yet are `NaN`; their count is the
//! warm-up length, during which the backtest does not consult the strategy.

mod ema;
mod rsi;
mod sma;

pub use ema::Ema;
pub use rsi::Rsi;
pub use sma::Sma;

use crate::engine::Candle;

/// A precomputed series aligned with the candles.
pub trait Indicator {
    /// Computes the series for `candles`, replacing any previous values.
    fn prepare(&mut self, candles: &[Candle]);

    /// Returns the computed series, one value per candle.
    fn values(&self) -> &[f64];

    /// Number of leading candles without a value.
    fn warmup_length(&self) -> usize;

    /// Value `offset` candles away from `index` (`0` is `index`, `-1` the candle before).
    ///
    /// Positive offsets would read the future and always yield `None`, as do undefined entries.
    fn value_at(&self, index: usize, offset: isize) -> Option<f64> {
        if offset > 0 {
            return None;
        }
        let index = index.checked_sub(offset.unsigned_abs())?;
        self.values().get(index).copied().filter(|v| !v.is_nan())
    }
}

fn closes(candles: &[Candle]) -> impl Iterator<Item = f64> + '_ {
    candles.iter().map(Candle::close)
}

#[cfg(test)]
pub(crate) fn make_candles(closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::from((open, open.max(close) + 1.0, open.min(close) - 1.0, close))
        })
        .collect()
}

#[cfg(test)]
pub(crate) fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, epsilon={epsilon}"
    );
}

#[cfg(test)]
#[test]
fn value_at_offsets() {
    let mut sma = Sma::new(2).unwrap();
    sma.prepare(&make_candles(&[1.0, 3.0, 5.0]));

    assert_eq!(sma.value_at(2, 0), Some(4.0));
    assert_eq!(sma.value_at(2, -1), Some(2.0));
    // warm-up entry
    assert_eq!(sma.value_at(2, -2), None);
    // before the series
    assert_eq!(sma.value_at(2, -3), None);
    assert_eq!(sma.value_at(1, 1), None);
    assert_eq!(sma.value_at(7, 0), None);
}
