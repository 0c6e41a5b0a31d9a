//! Strategies and the read-only market view they receive.

use std::collections::vec_deque::Iter;

use chrono::{DateTime, Utc};

use crate::engine::{Account, Broker, CloseOrder, Data, OpenOrder, Order, Phase, Position, PositionType, Trade};
use crate::errors::{Error, Result};
use crate::indicators::{Indicator, Sma};

/// What a strategy can observe at the current phase.
///
/// Reading the close, high, low or volume during the OPEN phase fails with
/// [`Error::Lookahead`].
#[derive(Debug, Clone, Copy)]
pub struct Market<'a> {
    data: &'a Data,
    broker: &'a Broker,
    account: &'a Account,
}

impl<'a> Market<'a> {
    pub(crate) fn new(data: &'a Data, broker: &'a Broker, account: &'a Account) -> Self {
        Self { data, broker, account }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.data.phase()
    }

    /// Returns the index of the current candle.
    pub fn index(&self) -> usize {
        self.data.index()
    }

    /// Open price at OPEN, close price at CLOSE.
    pub fn price(&self) -> f64 {
        self.data.current_price()
    }

    /// Returns the timestamp of the current candle.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.data.timestamp()
    }

    /// Returns the opening price of the current candle.
    pub fn open(&self) -> f64 {
        self.data.open()
    }

    /// Returns the closing price of the current candle.
    pub fn close(&self) -> Result<f64> {
        self.data.close()
    }

    /// Returns the high of the current candle.
    pub fn high(&self) -> Result<f64> {
        self.data.high()
    }

    /// Returns the low of the current candle.
    pub fn low(&self) -> Result<f64> {
        self.data.low()
    }

    /// Returns the volume of the current candle.
    pub fn volume(&self) -> Result<Option<f64>> {
        self.data.volume()
    }

    /// Opening price `k` candles ago.
    pub fn open_n_ago(&self, k: usize) -> Option<f64> {
        self.data.open_n_ago(k)
    }

    /// Closing price `k` candles ago.
    pub fn close_n_ago(&self, k: usize) -> Option<f64> {
        self.data.close_n_ago(k)
    }

    /// Value of `indicator` at `offset` from the current candle (`0` now, `-1` the previous candle).
    ///
    /// The current candle's value depends on its close, so offset `0` is `None` during OPEN.
    pub fn indicator(&self, indicator: &dyn Indicator, offset: isize) -> Option<f64> {
        if offset == 0 && self.phase() == Phase::Open {
            return None;
        }
        indicator.value_at(self.index(), offset)
    }

    /// Returns the open positions, oldest first.
    pub fn positions(&self) -> &'a [Position] {
        self.broker.positions()
    }

    /// Total units held in `position_type`.
    pub fn exposure(&self, position_type: PositionType) -> u64 {
        self.positions()
            .iter()
            .filter(|p| p.position_type() == position_type)
            .map(Position::size)
            .sum()
    }

    /// Returns the queued limit orders.
    pub fn pending_orders(&self) -> Iter<'a, Order> {
        self.broker.pending_orders()
    }

    /// Returns the fills so far.
    pub fn trades(&self) -> &'a [Trade] {
        self.broker.trades()
    }

    /// Returns the available cash.
    pub fn cash(&self) -> f64 {
        self.account.current_cash()
    }
}

/// A trading strategy driven by the backtest.
///
/// `collect_orders` is called twice per candle, once per phase, after the
/// stop-loss and take-profit checks of that phase.
pub trait Strategy {
    /// Indicators owned by the strategy. They are prepared over the full series
    /// before the run, and the longest warm-up delays the first call to
    /// [`Strategy::collect_orders`].
    fn indicators(&mut self) -> Vec<&mut dyn Indicator> {
        Vec::new()
    }

    /// Orders to submit at the current phase.
    fn collect_orders(&mut self, market: &Market<'_>) -> Result<Vec<Order>>;
}

impl<F> Strategy for F
where
    F: FnMut(&Market<'_>) -> Result<Vec<Order>>,
{
    fn collect_orders(&mut self, market: &Market<'_>) -> Result<Vec<Order>> {
        self(market)
    }
}

/// Builds an indicator-free strategy from a closure.
///
/// ### Example
/// ```rust
/// use candlebt::prelude::*;
///
/// let mut buy_once = strategy::from_fn(|market| {
///     if market.index() == 0 && market.phase() == Phase::Open {
///         return Ok(vec![OpenOrder::new(1, PositionType::Long)?.into()]);
///     }
///     Ok(Vec::new())
/// });
///
/// let data = Data::new(vec![Candle::from((10.0, 12.0, 9.0, 11.0))]).unwrap();
/// let mut backtest = Backtest::new(data, BacktestConfig::default().with_money(100.0)).unwrap();
/// backtest.run(&mut buy_once).unwrap();
/// assert_eq!(backtest.final_equity(), 101.0);
/// ```
pub fn from_fn<F>(f: F) -> F
where
    F: FnMut(&Market<'_>) -> Result<Vec<Order>>,
{
    f
}

/// Moving average crossover, long only.
///
/// At the OPEN phase, compares yesterday's fast and slow averages with the
/// day before: a cross above opens `size` units when flat, a cross below
/// closes every long unit.
#[derive(Debug, Clone)]
pub struct SmaCross {
    fast: Sma,
    slow: Sma,
    size: u64,
}

impl SmaCross {
    /// Creates the strategy.
    pub fn new(fast: usize, slow: usize, size: u64) -> Result<Self> {
        if size == 0 {
            return Err(Error::ZeroOrderSize);
        }
        Ok(Self {
            fast: Sma::new(fast)?,
            slow: Sma::new(slow)?,
            size,
        })
    }
}

impl Strategy for SmaCross {
    fn indicators(&mut self) -> Vec<&mut dyn Indicator> {
        vec![&mut self.fast as &mut dyn Indicator, &mut self.slow]
    }

    fn collect_orders(&mut self, market: &Market<'_>) -> Result<Vec<Order>> {
        if market.phase() != Phase::Open {
            return Ok(Vec::new());
        }

        let (Some(fast), Some(slow), Some(prev_fast), Some(prev_slow)) = (
            market.indicator(&self.fast, -1),
            market.indicator(&self.slow, -1),
            market.indicator(&self.fast, -2),
            market.indicator(&self.slow, -2),
        ) else {
            return Ok(Vec::new());
        };

        let exposure = market.exposure(PositionType::Long);
        if prev_fast <= prev_slow && fast > slow && exposure == 0 {
            return Ok(vec![OpenOrder::new(self.size, PositionType::Long)?.into()]);
        }
        if prev_fast >= prev_slow && fast < slow && exposure > 0 {
            return Ok(vec![CloseOrder::by_type(exposure, PositionType::Long)?.into()]);
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BacktestConfig, engine::Backtest, indicators::make_candles};

    #[test]
    fn sma_cross_round_trip() {
        // fast(1) crosses above slow(2) between candles 1 and 2, and back below at 4
        let closes = [10.0, 9.0, 12.0, 13.0, 8.0, 7.0, 7.0];
        let data = Data::new(make_candles(&closes)).unwrap();
        let mut backtest = Backtest::new(data, BacktestConfig::default().with_money(100.0)).unwrap();
        let mut strategy = SmaCross::new(1, 2, 1).unwrap();
        backtest.run(&mut strategy).unwrap();

        let trades = backtest.trades();
        assert_eq!(trades.len(), 2);
        assert!(trades[0].is_open());
        assert_eq!(trades[0].index(), 3);
        assert_eq!(trades[0].price(), 12.0);
        assert_eq!(trades[1].index(), 5);
        assert_eq!(trades[1].price(), 8.0);
        assert_eq!(backtest.final_equity(), 96.0);
    }

    #[test]
    fn sma_cross_rejects_zero_size() {
        assert!(matches!(SmaCross::new(2, 5, 0), Err(Error::ZeroOrderSize)));
        assert!(matches!(SmaCross::new(0, 5, 1), Err(Error::InvalidPeriod(0))));
    }

    #[test]
    fn market_guards_lookahead() {
        let mut data = Data::new(vec![crate::engine::Candle::from((10.0, 12.0, 9.0, 11.0))]).unwrap();
        let broker = Broker::new(0.0, None).unwrap();
        let account = Account::new(1, 100.0).unwrap();

        let market = Market::new(&data, &broker, &account);
        assert_eq!(market.price(), 10.0);
        assert!(matches!(market.close(), Err(Error::Lookahead("close"))));
        assert!(matches!(market.high(), Err(Error::Lookahead(_))));

        data.set_phase(Phase::Close);
        let market = Market::new(&data, &broker, &account);
        assert_eq!(market.price(), 11.0);
        assert_eq!(market.close().unwrap(), 11.0);
        assert_eq!(market.low().unwrap(), 9.0);
        assert_eq!(market.cash(), 100.0);
    }

    #[test]
    fn current_indicator_value_is_hidden_at_open() {
        let candles = crate::indicators::make_candles(&[10.0, 12.0, 14.0]);
        let mut data = Data::new(candles.clone()).unwrap();
        let broker = Broker::new(0.0, None).unwrap();
        let account = Account::new(3, 100.0).unwrap();
        let mut sma = Sma::new(2).unwrap();
        sma.prepare(&candles);
        data.advance_index();

        let market = Market::new(&data, &broker, &account);
        assert_eq!(market.indicator(&sma, 0), None);
        assert_eq!(market.indicator(&sma, -1), None);
        assert_eq!(market.indicator(&sma, 1), None);

        data.set_phase(Phase::Close);
        let market = Market::new(&data, &broker, &account);
        assert_eq!(market.indicator(&sma, 0), Some(11.0));

        data.advance_index();
        let market = Market::new(&data, &broker, &account);
        assert_eq!(market.indicator(&sma, 0), None);
        assert_eq!(market.indicator(&sma, -1), Some(11.0));
    }
}
