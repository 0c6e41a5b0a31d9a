//! Performance statistics of a finished run.
//!
//! This module provides:
//! - Trade counts by action and direction
//! - Final cash, assets value and equity
//! - Max drawdown, absolute and as a percentage
//! - Beta and Jensen's alpha against a benchmark series
//! - Commission paid, win rate and profit factor

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::{Backtest, Candle, PositionType, Trade};

/// Summary of a backtest run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    total_trades: usize,
    total_open_trades: usize,
    total_close_trades: usize,
    total_open_long_trades: usize,
    total_close_long_trades: usize,
    total_open_short_trades: usize,
    total_close_short_trades: usize,
    initial_money: f64,
    final_money: f64,
    final_assets_value: f64,
    final_total_equity: f64,
    return_value: f64,
    max_drawdown: f64,
    max_drawdown_percentage: f64,
    beta: Option<f64>,
    alpha: Option<f64>,
    total_commission: f64,
    win_rate: f64,
    profit_factor: Option<f64>,
}

impl From<&Backtest> for Statistics {
    fn from(value: &Backtest) -> Self {
        let trades = value.trades();
        let count = |open: bool, position_type: Option<PositionType>| {
            trades
                .iter()
                .filter(|t| t.is_open() == open && position_type.is_none_or(|pt| t.position_type() == pt))
                .count()
        };

        let equity = value.equity_series();
        let (max_drawdown, max_drawdown_percentage) = max_drawdown(equity);

        let benchmark = value
            .benchmark()
            .map(|data| data.candles().iter().map(Candle::close).collect::<Vec<_>>())
            .unwrap_or_default();
        let beta = beta(equity, &benchmark);
        let alpha = beta.and_then(|beta| alpha(equity, &benchmark, beta, value.config().risk_free_rate));

        let (gross_profit, gross_loss, winners) = trades.iter().filter_map(Trade::pnl).fold(
            (0.0, 0.0, 0),
            |(profit, loss, winners), pnl| {
                if pnl > 0.0 {
                    (profit + pnl, loss, winners + 1)
                } else {
                    (profit, loss - pnl, winners)
                }
            },
        );
        let total_close_trades = count(false, None);

        Self {
            total_trades: trades.len(),
            total_open_trades: count(true, None),
            total_close_trades,
            total_open_long_trades: count(true, Some(PositionType::Long)),
            total_close_long_trades: count(false, Some(PositionType::Long)),
            total_open_short_trades: count(true, Some(PositionType::Short)),
            total_close_short_trades: count(false, Some(PositionType::Short)),
            initial_money: value.initial_cash(),
            final_money: value.current_cash(),
            final_assets_value: value.final_assets_value(),
            final_total_equity: value.final_equity(),
            return_value: value.return_value(),
            max_drawdown,
            max_drawdown_percentage,
            beta,
            alpha,
            total_commission: value.broker().commission_paid(),
            win_rate: if total_close_trades == 0 {
                0.0
            } else {
                winners as f64 / total_close_trades as f64 * 100.0
            },
            profit_factor: (gross_loss > 0.0).then(|| gross_profit / gross_loss),
        }
    }
}

impl Statistics {
    /// Returns the number of fills.
    pub fn total_trades(&self) -> usize {
        self.total_trades
    }

    /// Returns the number of open fills.
    pub fn total_open_trades(&self) -> usize {
        self.total_open_trades
    }

    /// Returns the number of close fills.
    pub fn total_close_trades(&self) -> usize {
        self.total_close_trades
    }

    /// Returns the number of long open fills.
    pub fn total_open_long_trades(&self) -> usize {
        self.total_open_long_trades
    }

    /// Returns the number of long close fills.
    pub fn total_close_long_trades(&self) -> usize {
        self.total_close_long_trades
    }

    /// Returns the number of short open fills.
    pub fn total_open_short_trades(&self) -> usize {
        self.total_open_short_trades
    }

    /// Returns the number of short close fills.
    pub fn total_close_short_trades(&self) -> usize {
        self.total_close_short_trades
    }

    /// Returns the initial cash.
    pub fn initial_money(&self) -> f64 {
        self.initial_money
    }

    /// Returns the cash at the end of the run.
    pub fn final_money(&self) -> f64 {
        self.final_money
    }

    /// Returns the mark-to-market value of the positions left open.
    pub fn final_assets_value(&self) -> f64 {
        self.final_assets_value
    }

    /// Returns the final cash plus assets value.
    pub fn final_total_equity(&self) -> f64 {
        self.final_total_equity
    }

    /// Returns the final equity minus the initial cash.
    pub fn return_value(&self) -> f64 {
        self.return_value
    }

    /// Largest fall of the equity from a running peak.
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    /// The max drawdown as a percentage of the peak it fell from.
    pub fn max_drawdown_percentage(&self) -> f64 {
        self.max_drawdown_percentage
    }

    /// Sensitivity of the equity returns to the benchmark returns.
    pub fn beta(&self) -> Option<f64> {
        self.beta
    }

    /// Jensen's alpha over the whole run.
    pub fn alpha(&self) -> Option<f64> {
        self.alpha
    }

    /// Returns the commission paid.
    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    /// Percentage of close fills with a positive gross pnl.
    pub fn win_rate(&self) -> f64 {
        self.win_rate
    }

    /// Gross profit over gross loss of the close fills, `None` without losses.
    pub fn profit_factor(&self) -> Option<f64> {
        self.profit_factor
    }
}

/// Largest absolute peak-to-trough fall and its percentage of that peak.
fn max_drawdown(equity: &[f64]) -> (f64, f64) {
    let Some(&first) = equity.first() else {
        return (0.0, 0.0);
    };

    let mut peak = first;
    let mut max_drawdown = 0.0;
    let mut percentage = 0.0;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        let drawdown = peak - value;
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
            percentage = if peak > 0.0 { drawdown / peak * 100.0 } else { 0.0 };
        }
    }
    (max_drawdown, percentage)
}

/// Number of candles covered by both the equity (`N + 1` slots) and the benchmark.
fn paired_len(equity: &[f64], benchmark: &[f64]) -> usize {
    equity.len().saturating_sub(1).min(benchmark.len())
}

/// `cov(equity returns, benchmark returns) / var(benchmark returns)`, sample estimators.
fn beta(equity: &[f64], benchmark: &[f64]) -> Option<f64> {
    let len = paired_len(equity, benchmark);
    let pairs = (1..len)
        .map(|i| (equity[i + 1] / equity[i] - 1.0, benchmark[i] / benchmark[i - 1] - 1.0))
        .filter(|(e, b)| e.is_finite() && b.is_finite())
        .collect::<Vec<_>>();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_e = pairs.iter().map(|(e, _)| e).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;
    let covariance = pairs.iter().map(|(e, b)| (e - mean_e) * (b - mean_b)).sum::<f64>() / (n - 1.0);
    let variance = pairs.iter().map(|(_, b)| (b - mean_b).powi(2)).sum::<f64>() / (n - 1.0);
    if variance == 0.0 {
        return None;
    }
    Some(covariance / variance)
}

/// `equity_return - rf - beta * (benchmark_return - rf)` over the paired candles.
fn alpha(equity: &[f64], benchmark: &[f64], beta: f64, risk_free_rate: f64) -> Option<f64> {
    let len = paired_len(equity, benchmark);
    let (&first_equity, &last_equity) = (equity.first()?, equity.get(len)?);
    let (&first_close, &last_close) = (benchmark.first()?, benchmark.get(len.checked_sub(1)?)?);

    let equity_return = last_equity / first_equity - 1.0;
    let benchmark_return = last_close / first_close - 1.0;
    Some(equity_return - risk_free_rate - beta * (benchmark_return - risk_free_rate))
}

fn optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Backtest Statistics ===")?;
        writeln!(
            f,
            "Trades: {} ({} open / {} close)",
            self.total_trades, self.total_open_trades, self.total_close_trades
        )?;
        writeln!(
            f,
            "Long: {} open / {} close",
            self.total_open_long_trades, self.total_close_long_trades
        )?;
        writeln!(
            f,
            "Short: {} open / {} close",
            self.total_open_short_trades, self.total_close_short_trades
        )?;
        writeln!(f)?;
        writeln!(f, "Initial Money: {:.2}", self.initial_money)?;
        writeln!(f, "Final Money: {:.2}", self.final_money)?;
        writeln!(f, "Final Assets Value: {:.2}", self.final_assets_value)?;
        writeln!(f, "Final Total Equity: {:.2}", self.final_total_equity)?;
        writeln!(f, "Return: {:.2}", self.return_value)?;
        writeln!(f, "Commission Paid: {:.2}", self.total_commission)?;
        writeln!(f)?;
        writeln!(
            f,
            "Max Drawdown: {:.2} ({:.2}%)",
            self.max_drawdown, self.max_drawdown_percentage
        )?;
        writeln!(f, "Win Rate: {:.2}%", self.win_rate)?;
        writeln!(f, "Profit Factor: {}", optional(self.profit_factor))?;
        writeln!(f, "Beta: {}", optional(self.beta))?;
        write!(f, "Alpha: {}", optional(self.alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        BacktestConfig,
        engine::{CloseOrder, Data, OpenOrder, Phase},
        strategy::from_fn,
    };

    fn flat(closes: &[f64]) -> Data {
        Data::new(closes.iter().map(|&c| Candle::from((c, c, c, c))).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn max_drawdown_from_peak() {
        let (drawdown, percentage) = max_drawdown(&[10000.0, 12000.0, 9000.0, 11000.0]);
        assert_eq!(drawdown, 3000.0);
        assert_eq!(percentage, 25.0);
    }

    #[test]
    fn max_drawdown_is_the_largest_absolute_fall() {
        // 100 -> 50 is -50%, 1000 -> 800 is larger in money but only -20%
        let (drawdown, percentage) = max_drawdown(&[100.0, 50.0, 1000.0, 800.0]);
        assert_eq!(drawdown, 200.0);
        assert_eq!(percentage, 20.0);
    }

    #[test]
    fn max_drawdown_rising_curve() {
        assert_eq!(max_drawdown(&[100.0, 101.0, 105.0]), (0.0, 0.0));
        assert_eq!(max_drawdown(&[]), (0.0, 0.0));
    }

    #[test]
    fn beta_of_a_levered_curve() {
        let benchmark = [100.0, 110.0, 99.0, 108.9];
        let equity = [1000.0, 1000.0, 1200.0, 960.0, 1152.0];
        let beta = beta(&equity, &benchmark).unwrap();
        assert!((beta - 2.0).abs() < 1e-9);

        let alpha = alpha(&equity, &benchmark, beta, 0.0).unwrap();
        assert!((alpha - (0.152 - 2.0 * 0.089)).abs() < 1e-9);
    }

    #[test]
    fn beta_undefined_cases() {
        // single candle: no returns
        assert!(beta(&[100.0, 101.0], &[10.0]).is_none());
        // one pair only
        assert!(beta(&[100.0, 101.0, 102.0], &[10.0, 11.0]).is_none());
        // flat benchmark
        assert!(beta(&[100.0, 101.0, 103.0, 102.0], &[10.0, 10.0, 10.0]).is_none());
    }

    #[test]
    fn statistics_of_a_buy_and_hold() {
        let closes = [100.0, 110.0, 99.0, 108.9];
        let config = BacktestConfig::default().with_money(100.0);
        let mut bt = Backtest::new(flat(&closes), config).unwrap().with_benchmark(flat(&closes));
        let mut strategy = from_fn(|market| {
            if market.index() == 0 && market.phase() == Phase::Open {
                return Ok(vec![OpenOrder::new(1, crate::engine::PositionType::Long)?.into()]);
            }
            Ok(Vec::new())
        });
        bt.run(&mut strategy).unwrap();

        let stats = bt.statistics();
        assert_eq!(stats.total_trades(), 1);
        assert_eq!(stats.total_open_long_trades(), 1);
        assert_eq!(stats.final_money(), 0.0);
        assert_eq!(stats.final_assets_value(), 108.9);
        assert!((stats.beta().unwrap() - 1.0).abs() < 1e-9);
        assert!(stats.alpha().unwrap().abs() < 1e-9);
        assert!((stats.max_drawdown() - 11.0).abs() < 1e-9);
        assert!((stats.max_drawdown_percentage() - 10.0).abs() < 1e-9);
        assert_eq!(stats.win_rate(), 0.0);
        assert!(stats.profit_factor().is_none());
    }

    #[test]
    fn statistics_without_benchmark() {
        let mut bt = Backtest::new(flat(&[10.0, 11.0, 12.0]), BacktestConfig::default()).unwrap();
        bt.run(&mut from_fn(|_| Ok(Vec::new()))).unwrap();

        let stats = bt.statistics();
        assert_eq!(stats.total_trades(), 0);
        assert!(stats.beta().is_none());
        assert!(stats.alpha().is_none());
        assert_eq!(stats.final_total_equity(), 10_000.0);
        assert!(stats.to_string().contains("Beta: n/a"));
    }

    #[test]
    fn win_rate_and_profit_factor() {
        let data = Data::new(vec![
            Candle::from((10.0, 10.0, 10.0, 10.0)),
            Candle::from((14.0, 14.0, 14.0, 14.0)),
            Candle::from((8.0, 8.0, 8.0, 8.0)),
        ])
        .unwrap();
        let config = BacktestConfig::default().with_commission(crate::engine::Commission::Fixed { fee: 0.5 });
        let mut bt = Backtest::new(data, config).unwrap();
        let mut strategy = from_fn(|market| {
            use crate::engine::PositionType::Long;
            if market.phase() != Phase::Open {
                return Ok(Vec::new());
            }
            let orders = match market.index() {
                0 => vec![OpenOrder::new(2, Long)?.into()],
                // +4 on the first unit, -2 on the second
                1 => vec![CloseOrder::by_type(1, Long)?.into()],
                _ => vec![CloseOrder::by_type(1, Long)?.into()],
            };
            Ok(orders)
        });
        bt.run(&mut strategy).unwrap();

        let stats = bt.statistics();
        assert_eq!(stats.total_close_long_trades(), 2);
        assert_eq!(stats.win_rate(), 50.0);
        assert_eq!(stats.profit_factor(), Some(4.0 / 2.0));
        assert_eq!(stats.total_commission(), 1.5);
    }
}
