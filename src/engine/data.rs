use std::{fmt, path::Path, sync::Arc};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::Candle;
use crate::errors::{Error, Result};

/// The two instants of a candle at which the broker runs.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// Only the opening print is known.
    #[default]
    Open,
    /// The whole candle is known.
    Close,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Close => write!(f, "CLOSE"),
        }
    }
}

/// Index-advanced view over a fixed series of candles.
///
/// The current index and phase define "now": prices that are not yet known at
/// the current phase are either clamped ([`Data::current_low`], [`Data::current_high`])
/// or refused with [`Error::Lookahead`].
#[derive(Debug, Clone)]
pub struct Data {
    candles: Arc<[Candle]>,
    index: usize,
    phase: Phase,
}

impl Data {
    /// Creates a view positioned on the first candle, OPEN phase.
    pub fn new(candles: impl Into<Arc<[Candle]>>) -> Result<Self> {
        let candles = candles.into();
        if candles.is_empty() {
            return Err(Error::CandleDataEmpty);
        }
        Ok(Self {
            candles,
            index: 0,
            phase: Phase::Open,
        })
    }

    /// Loads candles from a delimited file with a header row.
    ///
    /// Columns are taken by position: timestamp, open, high, low, close, volume.
    /// An empty timestamp or volume cell is read as absent.
    pub fn from_csv(path: impl AsRef<Path>, delimiter: u8) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let candles = read_candles(reader)?;
        tracing::debug!(path = %path.display(), candles = candles.len(), "loaded candles");
        Self::new(candles)
    }

    /// Reads candles from any reader, same format as [`Data::from_csv`].
    pub fn from_reader<R: std::io::Read>(reader: R, delimiter: u8) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::new(read_candles(reader)?)
    }

    /// Returns every candle of the series.
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Returns the number of candles.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    /// Returns the current (0-based) candle index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Moves to the next candle and back to the OPEN phase.
    /// Once the series is exhausted the clock stays on the last candle and phase.
    pub(crate) fn advance_index(&mut self) -> bool {
        if self.index + 1 < self.candles.len() {
            self.index += 1;
            self.phase = Phase::Open;
            true
        } else {
            false
        }
    }

    pub(crate) fn rewind(&mut self) {
        self.index = 0;
        self.phase = Phase::Open;
    }

    fn candle(&self) -> &Candle {
        &self.candles[self.index]
    }

    fn known(&self, field: &'static str) -> Result<()> {
        match self.phase {
            Phase::Open => Err(Error::Lookahead(field)),
            Phase::Close => Ok(()),
        }
    }

    /// Returns the timestamp of the current candle.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.candle().timestamp()
    }

    /// Returns the opening price of the current candle.
    pub fn open(&self) -> f64 {
        self.candle().open()
    }

    /// Returns the closing price of the current candle.
    ///
    /// Fails with [`Error::Lookahead`] during the OPEN phase.
    pub fn close(&self) -> Result<f64> {
        self.known("close")?;
        Ok(self.candle().close())
    }

    /// Returns the high of the current candle. Fails during the OPEN phase.
    pub fn high(&self) -> Result<f64> {
        self.known("high")?;
        Ok(self.candle().high())
    }

    /// Returns the low of the current candle. Fails during the OPEN phase.
    pub fn low(&self) -> Result<f64> {
        self.known("low")?;
        Ok(self.candle().low())
    }

    /// Returns the volume of the current candle. Fails during the OPEN phase.
    pub fn volume(&self) -> Result<Option<f64>> {
        self.known("volume")?;
        Ok(self.candle().volume())
    }

    /// Open price at OPEN, close price at CLOSE.
    pub fn current_price(&self) -> f64 {
        match self.phase {
            Phase::Open => self.candle().open(),
            Phase::Close => self.candle().close(),
        }
    }

    /// Lowest price observed so far in the candle.
    pub fn current_low(&self) -> f64 {
        match self.phase {
            Phase::Open => self.candle().open(),
            Phase::Close => self.candle().low(),
        }
    }

    /// Highest price observed so far in the candle.
    pub fn current_high(&self) -> f64 {
        match self.phase {
            Phase::Open => self.candle().open(),
            Phase::Close => self.candle().high(),
        }
    }

    /// Opening price `k` candles ago (`k >= 1`), `None` beyond the history.
    pub fn open_n_ago(&self, k: usize) -> Option<f64> {
        self.n_ago(k).map(Candle::open)
    }

    /// Closing price `k` candles ago (`k >= 1`), `None` beyond the history.
    pub fn close_n_ago(&self, k: usize) -> Option<f64> {
        self.n_ago(k).map(Candle::close)
    }

    fn n_ago(&self, k: usize) -> Option<&Candle> {
        if k == 0 {
            return None;
        }
        self.index.checked_sub(k).map(|i| &self.candles[i])
    }
}

fn read_candles<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<Candle>> {
    let mut candles = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row_error = |message: String| Error::CsvRow { line, message };

        let field = |i: usize| record.get(i).unwrap_or_default();
        let price = |i: usize, name: &str| -> Result<f64> {
            field(i)
                .parse::<f64>()
                .map_err(|e| row_error(format!("invalid {name} {:?}: {e}", field(i))))
        };

        let timestamp = match field(0) {
            "" => None,
            raw => Some(parse_timestamp(raw).ok_or_else(|| row_error(format!("invalid timestamp {raw:?}")))?),
        };
        let volume = match field(5) {
            "" => None,
            raw => Some(
                raw.parse::<f64>()
                    .map_err(|e| row_error(format!("invalid volume {raw:?}: {e}")))?,
            ),
        };

        let mut builder = super::CandleBuilder::builder()
            .open(price(1, "open")?)
            .high(price(2, "high")?)
            .low(price(3, "low")?)
            .close(price(4, "close")?);
        if let Some(timestamp) = timestamp {
            builder = builder.timestamp(timestamp);
        }
        if let Some(volume) = volume {
            builder = builder.volume(volume);
        }
        candles.push(builder.build().map_err(|e| row_error(e.to_string()))?);
    }
    Ok(candles)
}

/// Parses RFC 3339 or the common naive ISO 8601 layouts (read as UTC).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_candles() -> Data {
        Data::new(vec![
            Candle::from((18.0, 18.0, 17.1, 17.5)),
            Candle::from((16.5, 18.5, 16.0, 18.5)),
        ])
        .unwrap()
    }

    #[test]
    fn empty_data_is_rejected() {
        let result = Data::new(Vec::<Candle>::new());
        assert!(matches!(result, Err(Error::CandleDataEmpty)));
    }

    #[test]
    fn open_phase_clamps_range_to_open() {
        let data = two_candles();
        assert_eq!(data.phase(), Phase::Open);
        assert_eq!(data.current_price(), 18.0);
        assert_eq!(data.current_low(), 18.0);
        assert_eq!(data.current_high(), 18.0);
    }

    #[test]
    fn close_phase_exposes_full_range() {
        let mut data = two_candles();
        data.set_phase(Phase::Close);
        assert_eq!(data.current_price(), 17.5);
        assert_eq!(data.current_low(), 17.1);
        assert_eq!(data.current_high(), 18.0);
        assert_eq!(data.close().unwrap(), 17.5);
    }

    #[test]
    fn close_is_refused_during_open() {
        let data = two_candles();
        assert!(matches!(data.close(), Err(Error::Lookahead("close"))));
        assert!(matches!(data.high(), Err(Error::Lookahead("high"))));
        assert!(matches!(data.low(), Err(Error::Lookahead("low"))));
        assert_eq!(data.open(), 18.0);
    }

    #[test]
    fn advance_resets_phase_and_stops_at_end() {
        let mut data = two_candles();
        data.set_phase(Phase::Close);
        assert!(data.advance_index());
        assert_eq!(data.index(), 1);
        assert_eq!(data.phase(), Phase::Open);
        assert!(!data.advance_index());
        assert_eq!(data.index(), 1);
    }

    #[test]
    fn lookback_accessors() {
        let mut data = two_candles();
        assert_eq!(data.close_n_ago(1), None);
        data.advance_index();
        assert_eq!(data.close_n_ago(1), Some(17.5));
        assert_eq!(data.open_n_ago(1), Some(18.0));
        assert_eq!(data.open_n_ago(2), None);
        assert_eq!(data.close_n_ago(0), None);
    }

    #[test]
    fn read_csv_with_custom_delimiter() {
        let raw = "date;open;high;low;close;volume\n\
                   2024-01-02;10;12;9;11;1000\n\
                   2024-01-03T00:00:00Z;11;13;10.5;12.5;\n\
                   ;12.5;13;12;12;5\n";
        let data = Data::from_reader(raw.as_bytes(), b';').unwrap();
        assert_eq!(data.len(), 3);

        let candles = data.candles();
        assert_eq!(candles[0].timestamp(), candles[1].timestamp().map(|t| t - chrono::Duration::days(1)));
        assert_eq!(candles[0].volume(), Some(1000.0));
        assert_eq!(candles[1].volume(), None);
        assert_eq!(candles[1].low(), 10.5);
        assert!(candles[2].timestamp().is_none());
    }

    #[test]
    fn read_csv_reports_bad_rows() {
        let raw = "timestamp,open,high,low,close,volume\n2024-01-02,10,abc,9,11,1\n";
        let result = Data::from_reader(raw.as_bytes(), b',');
        assert!(matches!(result, Err(Error::CsvRow { line: 2, .. })));
    }

    #[test]
    fn timestamp_layouts() {
        assert!(parse_timestamp("2024-01-02T10:00:00+02:00").is_some());
        assert!(parse_timestamp("2024-01-02 10:00:00").is_some());
        assert!(parse_timestamp("2024-01-02").is_some());
        assert!(parse_timestamp("02/01/2024").is_none());
    }
}
