//! # SMA crossover with commission
//!
//! Runs the bundled [`SmaCross`] strategy on a slowly rising, cyclical
//! series, paying a 0.1% commission with a $1 minimum on every fill, and
//! compares it with the series itself as benchmark.

use candlebt::prelude::*;

fn cyclical_candles(len: usize) -> Vec<Candle> {
    let mut open: f64 = 50.0;

    (0..len)
        .map(|i| {
            let close = 50.0 + 10.0 * (i as f64 / 15.0).sin() + 0.05 * i as f64;
            let candle = Candle::from((open, open.max(close) + 0.5, open.min(close) - 0.5, close));
            open = close;
            candle
        })
        .collect()
}

fn main() -> Result<()> {
    let data = Data::new(cyclical_candles(500))?;
    let benchmark = data.clone();

    let config = BacktestConfig::default()
        .with_money(5_000.0)
        .with_commission(Commission::MinimumRelative {
            minimum: 1.0,
            rate: 0.001,
        });
    let mut backtest = Backtest::new(data, config)?.with_benchmark(benchmark);
    let mut strategy = SmaCross::new(5, 20, 50)?;

    backtest.run(&mut strategy)?;

    for trade in backtest.trades().iter().take(6) {
        println!("{trade:?}");
    }
    println!("{}", backtest.statistics());

    Ok(())
}
