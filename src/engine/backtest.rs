use tracing::{info, trace};

use super::{Account, Broker, Data, Phase, Position, Trade};
use crate::{
    config::BacktestConfig,
    errors::Result,
    metrics::Statistics,
    strategy::{Market, Strategy},
};

/// Backtesting engine.
///
/// Walks the candles and, for each of the OPEN and CLOSE phases, runs the
/// broker's stop-loss and take-profit checks, hands the strategy's orders to
/// the broker and then retries the queued limit orders. The account is marked
/// to market after the CLOSE phase of every candle.
#[derive(Debug)]
pub struct Backtest {
    data: Data,
    account: Account,
    broker: Broker,
    config: BacktestConfig,
    benchmark: Option<Data>,
    warmup: usize,
}

impl std::ops::Deref for Backtest {
    type Target = Account;

    fn deref(&self) -> &Self::Target {
        &self.account
    }
}

impl Backtest {
    /// Creates a new backtest.
    ///
    /// ### Arguments
    /// * `data` - Candles to replay.
    /// * `config` - Initial cash and frictions, validated here.
    ///
    /// ### Returns
    /// The new backtest or the first invalid option.
    pub fn new(data: Data, config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        let account = Account::new(data.len(), config.money)?;
        let broker = Broker::new(config.spread, config.commission)?
            .with_position_mode(config.position_mode)
            .with_strict_close(config.strict_close);

        Ok(Self {
            data,
            account,
            broker,
            config,
            benchmark: None,
            warmup: 0,
        })
    }

    /// Attaches a benchmark series, used by the statistics for alpha and beta.
    pub fn with_benchmark(mut self, benchmark: Data) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    /// Returns the candles being replayed.
    pub fn data(&self) -> &Data {
        &self.data
    }

    /// Returns the account.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Returns the broker.
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Returns the benchmark series.
    pub fn benchmark(&self) -> Option<&Data> {
        self.benchmark.as_ref()
    }

    /// Returns the open positions.
    pub fn positions(&self) -> &[Position] {
        self.broker.positions()
    }

    /// Returns the trade log.
    pub fn trades(&self) -> &[Trade] {
        self.broker.trades()
    }

    /// Number of leading candles skipped by the last run.
    pub fn warmup(&self) -> usize {
        self.warmup
    }

    /// Computes the statistics of the last run.
    pub fn statistics(&self) -> Statistics {
        Statistics::from(self)
    }

    /// Runs `strategy` over the whole series.
    ///
    /// The backtest is reset first, so running the same strategy twice yields
    /// the same trades and equity. A fatal error aborts the run; what was
    /// recorded up to that point stays readable.
    pub fn run<S>(&mut self, strategy: &mut S) -> Result<()>
    where
        S: Strategy + ?Sized,
    {
        self.reset();

        let mut warmup = 0;
        for indicator in strategy.indicators() {
            indicator.prepare(self.data.candles());
            warmup = warmup.max(indicator.warmup_length());
        }
        self.warmup = warmup;
        info!(
            candles = self.data.len(),
            warmup,
            money = self.account.initial_cash(),
            "backtest started"
        );

        loop {
            let index = self.data.index();
            if index < warmup {
                self.account.set_assets_value(index, 0.0);
            } else {
                self.run_phase(strategy, Phase::Open)?;
                self.run_phase(strategy, Phase::Close)?;
                self.account.set_assets_value(index, self.broker.assets_value(&self.data));
            }
            self.account.finalize_equity(index);

            if !self.data.advance_index() {
                break;
            }
        }

        info!(
            trades = self.broker.trades().len(),
            positions = self.broker.positions().len(),
            pending_orders = self.broker.pending_orders().len(),
            final_equity = self.account.final_equity(),
            "backtest finished"
        );
        Ok(())
    }

    /// Resets the backtest to its initial state.
    pub fn reset(&mut self) {
        self.data.rewind();
        self.account.reset();
        self.broker.reset();
        self.warmup = 0;
    }

    fn run_phase<S>(&mut self, strategy: &mut S, phase: Phase) -> Result<()>
    where
        S: Strategy + ?Sized,
    {
        self.data.set_phase(phase);
        trace!(
            index = self.data.index(),
            %phase,
            price = self.data.current_price(),
            cash = self.account.current_cash(),
            "phase"
        );

        self.broker.process_stop_losses(&self.data, &mut self.account)?;
        self.broker.process_take_profits(&self.data, &mut self.account)?;
        let orders = strategy.collect_orders(&Market::new(&self.data, &self.broker, &self.account))?;
        self.broker.process_new_orders(&self.data, &mut self.account, orders)?;
        self.broker.process_limit_orders(&self.data, &mut self.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::{Candle, CloseOrder, OpenOrder, Order, PositionMode, PositionType, UpdateOrder},
        errors::Error,
        indicators::{Indicator, Sma},
        strategy::from_fn,
    };

    fn backtest(candles: Vec<Candle>, money: f64) -> Backtest {
        let data = Data::new(candles).unwrap();
        Backtest::new(data, BacktestConfig::default().with_money(money)).unwrap()
    }

    fn open_long_at_open(
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> impl FnMut(&Market<'_>) -> Result<Vec<Order>> {
        move |market| {
            if market.phase() != Phase::Open {
                return Ok(Vec::new());
            }
            let mut order = OpenOrder::new(1, PositionType::Long)?;
            if let Some(stop) = stop_loss {
                order = order.stop_loss(market.open() + stop);
            }
            if let Some(take) = take_profit {
                order = order.take_profit(market.open() + take);
            }
            Ok(vec![order.into()])
        }
    }

    /// Exposure still open equals opened minus closed units, per direction.
    fn assert_exposure_balanced(bt: &Backtest) {
        for position_type in [PositionType::Long, PositionType::Short] {
            let (opened, closed) = bt
                .trades()
                .iter()
                .filter(|t| t.position_type() == position_type)
                .fold((0, 0), |(o, c), t| {
                    if t.is_open() { (o + t.size(), c) } else { (o, c + t.size()) }
                });
            let held: u64 = bt
                .positions()
                .iter()
                .filter(|p| p.position_type() == position_type)
                .map(Position::size)
                .sum();
            assert_eq!(opened - closed, held);
        }
        assert!(bt.positions().iter().all(|p| p.size() > 0));
    }

    /// Every close refers to an earlier open with the same direction, price and candle.
    fn assert_closes_match_opens(bt: &Backtest) {
        let trades = bt.trades();
        for (i, trade) in trades.iter().enumerate() {
            if let Trade::Close {
                position_type,
                open_index,
                open_price,
                open_time,
                ..
            } = *trade
            {
                let found = trades[..i].iter().any(|t| {
                    matches!(*t, Trade::Open { position_type: pt, index, price, timestamp, .. }
                        if pt == position_type && index == open_index && price == open_price && timestamp == open_time)
                });
                assert!(found, "close trade {i} has no matching open");
            }
        }
    }

    #[test]
    fn long_take_profit_on_close() {
        let mut bt = backtest(vec![Candle::from((18.0, 19.5, 15.0, 19.5))], 100.0);
        let mut strategy = open_long_at_open(None, Some(1.0));
        bt.run(&mut strategy).unwrap();

        assert_eq!(bt.trades().len(), 2);
        assert!(bt.trades()[0].is_open());
        assert_eq!(bt.trades()[1].price(), 19.0);
        assert_eq!(bt.current_cash(), 101.0);
        assert_eq!(bt.final_assets_value(), 0.0);
        assert_eq!(bt.final_equity(), 101.0);
        assert_eq!(bt.return_value(), 1.0);
        assert_eq!(bt.statistics().max_drawdown(), 0.0);
    }

    #[test]
    fn long_stop_loss_on_gap_down() {
        let mut bt = backtest(
            vec![
                Candle::from((18.0, 18.0, 17.1, 17.5)),
                Candle::from((16.5, 18.5, 16.0, 18.5)),
            ],
            100.0,
        );
        let mut strategy = open_long_at_open(Some(-1.0), None);
        bt.run(&mut strategy).unwrap();

        assert_eq!(bt.trades().len(), 3);
        assert_eq!(bt.trades()[1].price(), 16.5);
        assert!(!bt.trades()[1].is_open());
        assert_eq!(bt.current_cash(), 82.0);
        assert_eq!(bt.final_assets_value(), 18.5);
        assert_eq!(bt.final_equity(), 100.5);
        assert_eq!(bt.equity_series(), &[100.0, 99.5, 100.5]);

        let stats = bt.statistics();
        assert!((stats.max_drawdown() - 0.5).abs() < 1e-9);
        assert!((stats.max_drawdown_percentage() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn short_take_profit_exact() {
        let mut bt = backtest(vec![Candle::from((18.0, 18.0, 15.0, 17.0))], 100.0);
        let mut strategy = from_fn(|market| {
            if market.phase() != Phase::Open {
                return Ok(Vec::new());
            }
            let order = OpenOrder::new(1, PositionType::Short)?.take_profit(market.open() - 1.0);
            Ok(vec![order.into()])
        });
        bt.run(&mut strategy).unwrap();

        assert_eq!(bt.trades().len(), 2);
        assert_eq!(bt.trades()[1].price(), 17.0);
        assert_eq!(bt.current_cash(), 101.0);
        assert_eq!(bt.final_equity(), 101.0);
    }

    #[test]
    fn trailing_stop_moved_by_strategy_fills_later() {
        let mut bt = backtest(
            vec![
                Candle::from((20.0, 21.0, 19.0, 20.0)),
                Candle::from((22.0, 24.0, 21.0, 23.0)),
                Candle::from((23.0, 23.5, 21.5, 22.0)),
            ],
            100.0,
        );
        let mut strategy = from_fn(|market| {
            if market.phase() == Phase::Open {
                if market.index() == 0 {
                    return Ok(vec![OpenOrder::new(1, PositionType::Long)?.stop_loss(15.0).into()]);
                }
                return Ok(Vec::new());
            }
            let trail = market.close()? - 1.0;
            Ok(market
                .positions()
                .iter()
                .filter(|p| p.stop_loss().is_none_or(|stop| trail > stop))
                .map(|p| Order::from(UpdateOrder::new(p).stop_loss(Some(trail))))
                .collect())
        });
        bt.run(&mut strategy).unwrap();

        // stop moves 15 -> 19 -> 22 and fills within the last candle's range
        assert_eq!(bt.trades().len(), 2);
        assert_eq!(bt.trades()[1].index(), 2);
        assert_eq!(bt.trades()[1].price(), 22.0);
        assert!(bt.positions().is_empty());
        assert_eq!(bt.final_equity(), 102.0);
    }

    #[test]
    fn distinct_reduction_across_candles() {
        let mut bt = backtest(
            vec![Candle::from((25.0, 50.0, 25.0, 50.0)), Candle::from((25.0, 30.0, 20.0, 28.0))],
            1000.0,
        );
        let mut strategy = from_fn(|market| {
            let order: Order = match (market.index(), market.phase()) {
                (0, Phase::Open) => OpenOrder::new(4, PositionType::Long)?.into(),
                (0, Phase::Close) => CloseOrder::position(1, &market.positions()[0])?.into(),
                (1, Phase::Open) => CloseOrder::by_type(3, PositionType::Long)?.into(),
                _ => return Ok(Vec::new()),
            };
            Ok(vec![order])
        });
        bt.run(&mut strategy).unwrap();

        assert_eq!(bt.trades().len(), 3);
        assert!(bt.positions().is_empty());
        assert_eq!(bt.current_cash(), 1025.0);
        assert_eq!(bt.equity_series(), &[1000.0, 1100.0, 1025.0]);
        assert_exposure_balanced(&bt);
        assert_closes_match_opens(&bt);
    }

    fn limit_at_first_close(limit: f64) -> impl FnMut(&Market<'_>) -> Result<Vec<Order>> {
        move |market| {
            if market.index() == 0 && market.phase() == Phase::Close {
                return Ok(vec![OpenOrder::new(1, PositionType::Long)?.limit(limit).into()]);
            }
            Ok(Vec::new())
        }
    }

    #[test]
    fn limit_long_fills_below_limit_on_next_open() {
        let mut bt = backtest(
            vec![Candle::from((100.0, 101.0, 94.0, 95.0)), Candle::from((85.0, 86.0, 84.0, 85.0))],
            1000.0,
        );
        bt.run(&mut limit_at_first_close(90.0)).unwrap();

        assert_eq!(bt.trades().len(), 1);
        assert_eq!(bt.trades()[0].price(), 85.0);
        assert!(!bt.trades()[0].is_market());
        assert_eq!(bt.trades()[0].index(), 1);
        assert_eq!(bt.final_assets_value(), 85.0);
        assert_eq!(bt.current_cash(), 915.0);
        assert_eq!(bt.broker().pending_orders().len(), 0);
    }

    #[test]
    fn limit_long_never_fills() {
        let mut bt = backtest(
            vec![Candle::from((100.0, 101.0, 94.0, 95.0)), Candle::from((95.0, 96.0, 94.0, 95.0))],
            1000.0,
        );
        bt.run(&mut limit_at_first_close(90.0)).unwrap();

        assert!(bt.trades().is_empty());
        assert!(bt.positions().is_empty());
        // still queued at the end of the data
        assert_eq!(bt.broker().pending_orders().len(), 1);
    }

    #[test]
    fn close_then_open_in_one_batch() {
        let mut bt = backtest(
            vec![Candle::from((10.0, 11.0, 9.0, 10.0)), Candle::from((12.0, 13.0, 11.0, 12.0))],
            10.0,
        );
        let mut strategy = from_fn(|market| {
            let orders = match (market.index(), market.phase()) {
                (0, Phase::Open) => vec![OpenOrder::new(1, PositionType::Long)?.into()],
                // the open is listed first but only affordable after the close
                (1, Phase::Open) => vec![
                    OpenOrder::new(1, PositionType::Short)?.into(),
                    CloseOrder::all(&market.positions()[0])?.into(),
                ],
                _ => Vec::new(),
            };
            Ok(orders)
        });
        bt.run(&mut strategy).unwrap();

        assert_eq!(bt.trades().len(), 3);
        assert_eq!(bt.positions()[0].position_type(), PositionType::Short);
        assert_eq!(bt.current_cash(), 0.0);
        assert_eq!(bt.final_equity(), 12.0);
    }

    #[test]
    fn lookahead_aborts_the_run() {
        let mut bt = backtest(vec![Candle::from((10.0, 11.0, 9.0, 10.0))], 100.0);
        let mut strategy = from_fn(|market| {
            let _ = market.close()?;
            Ok(Vec::new())
        });
        let result = bt.run(&mut strategy);
        assert!(matches!(result, Err(Error::Lookahead("close"))));
    }

    #[test]
    fn close_reads_are_allowed_at_close() {
        let mut bt = backtest(vec![Candle::from((10.0, 11.0, 9.0, 10.5))], 100.0);
        let mut seen = Vec::new();
        let mut strategy = from_fn(|market| {
            if market.phase() == Phase::Close {
                seen.push((market.close()?, market.high()?, market.low()?));
            }
            Ok(Vec::new())
        });
        bt.run(&mut strategy).unwrap();
        assert_eq!(seen, vec![(10.5, 11.0, 9.0)]);
    }

    struct Counting {
        sma: Sma,
        calls: Vec<(usize, Phase)>,
    }

    impl Strategy for Counting {
        fn indicators(&mut self) -> Vec<&mut dyn Indicator> {
            vec![&mut self.sma as &mut dyn Indicator]
        }

        fn collect_orders(&mut self, market: &Market<'_>) -> Result<Vec<Order>> {
            self.calls.push((market.index(), market.phase()));
            assert_eq!(market.indicator(&self.sma, 0).is_some(), market.phase() == Phase::Close);
            if market.index() == 2 && market.phase() == Phase::Open {
                return Ok(vec![OpenOrder::new(1, PositionType::Long)?.into()]);
            }
            Ok(Vec::new())
        }
    }

    #[test]
    fn warmup_skips_strategy_and_keeps_equity() {
        let candles = [10.0, 11.0, 12.0, 13.0].map(|c| Candle::from((c, c, c, c))).to_vec();
        let mut bt = backtest(candles, 100.0);
        let mut strategy = Counting {
            sma: Sma::new(3).unwrap(),
            calls: Vec::new(),
        };
        bt.run(&mut strategy).unwrap();

        assert_eq!(bt.warmup(), 2);
        assert_eq!(
            strategy.calls,
            vec![(2, Phase::Open), (2, Phase::Close), (3, Phase::Open), (3, Phase::Close)]
        );
        assert_eq!(bt.assets_series(), &[0.0, 0.0, 12.0, 13.0]);
        assert_eq!(bt.equity_series(), &[100.0, 100.0, 100.0, 100.0, 101.0]);
    }

    #[test]
    fn shorts_can_mark_negative() {
        let mut bt = backtest(vec![Candle::from((10.0, 25.0, 10.0, 25.0))], 100.0);
        let mut strategy = from_fn(|market| {
            if market.phase() == Phase::Open {
                return Ok(vec![OpenOrder::new(1, PositionType::Short)?.into()]);
            }
            Ok(Vec::new())
        });
        bt.run(&mut strategy).unwrap();

        assert_eq!(bt.final_assets_value(), -5.0);
        assert_eq!(bt.final_equity(), 85.0);
    }

    #[test]
    fn accumulate_rejects_short() {
        let data = Data::new(vec![Candle::from((10.0, 11.0, 9.0, 10.0))]).unwrap();
        let config = BacktestConfig::default().with_position_mode(PositionMode::Accumulate);
        let mut bt = Backtest::new(data, config).unwrap();
        let mut strategy = from_fn(|_| Ok(vec![OpenOrder::new(1, PositionType::Short)?.into()]));
        assert!(matches!(bt.run(&mut strategy), Err(Error::ShortInAccumulateMode)));
    }

    fn mixed_strategy() -> impl FnMut(&Market<'_>) -> Result<Vec<Order>> {
        |market| {
            let i = market.index();
            let mut orders = Vec::new();
            match market.phase() {
                Phase::Open => {
                    let side = if i % 3 == 0 { PositionType::Short } else { PositionType::Long };
                    let open = market.open();
                    let order = OpenOrder::new(1 + (i % 2) as u64, side)?;
                    let order = match side {
                        PositionType::Long => order.stop_loss(open - 2.0).take_profit(open + 3.0),
                        PositionType::Short => order.stop_loss(open + 2.0).take_profit(open - 3.0),
                    };
                    orders.push(order.into());
                    if i % 4 == 1 {
                        orders.push(OpenOrder::new(1, PositionType::Long)?.limit(open - 1.0).into());
                    }
                }
                Phase::Close => {
                    if i % 2 == 0 && market.exposure(PositionType::Long) > 0 {
                        orders.push(CloseOrder::by_type(2, PositionType::Long)?.into());
                    }
                    if let Some(short) = market.positions().iter().find(|p| p.position_type() == PositionType::Short) {
                        orders.push(CloseOrder::position(1, short)?.limit(market.close()? - 1.0).into());
                    }
                }
            }
            Ok(orders)
        }
    }

    fn wavy_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 50.0 + 6.0 * ((i as f64) * 0.7).sin();
                let close = base + 2.0 * ((i as f64) * 1.3).cos();
                Candle::from((base, base.max(close) + 1.5, base.min(close) - 1.5, close))
            })
            .collect()
    }

    #[test]
    fn invariants_hold_on_a_busy_run() {
        let data = Data::new(wavy_candles(60)).unwrap();
        let config = BacktestConfig::default().with_money(1000.0).with_spread(0.05);
        let mut bt = Backtest::new(data, config).unwrap();
        bt.run(&mut mixed_strategy()).unwrap();

        assert!(bt.trades().len() > 20);
        assert_exposure_balanced(&bt);
        assert_closes_match_opens(&bt);

        let equity = bt.equity_series();
        assert_eq!(equity.len(), 61);
        assert_eq!(equity[0], 1000.0);
        let last = bt.data().len() - 1;
        assert_eq!(equity[last + 1], bt.current_cash() + bt.assets_series()[last]);
        assert_eq!(bt.final_assets_value(), bt.broker().assets_value(bt.data()));
    }

    #[test]
    fn replay_is_identical() {
        let data = Data::new(wavy_candles(40)).unwrap();
        let config = BacktestConfig::default().with_money(500.0).with_spread(0.1);
        let mut bt = Backtest::new(data, config).unwrap();

        bt.run(&mut mixed_strategy()).unwrap();
        let trades = bt.trades().to_vec();
        let equity = bt.equity_series().to_vec();

        bt.run(&mut mixed_strategy()).unwrap();
        assert_eq!(bt.trades(), trades.as_slice());
        assert_eq!(bt.equity_series(), equity.as_slice());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let data = Data::new(vec![Candle::from((10.0, 11.0, 9.0, 10.0))]).unwrap();
        let result = Backtest::new(data, BacktestConfig::default().with_spread(-0.5));
        assert!(matches!(result, Err(Error::NegSpread(_))));
    }
}
