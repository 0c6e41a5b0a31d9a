//! # Trend following with Take profit and Stop loss
//!
//! Buys when the close sits above a long EMA while the RSI is not overbought,
//! and leaves every exit to the broker: each entry carries a take-profit 6%
//! above and a stop-loss 2% below its reference price (1/3 risk-reward).

use candlebt::prelude::*;

/// Deterministic trending series with a sine wave on top.
fn generate_sample_candles(len: usize, seed: i32, base_price: f64) -> Vec<Candle> {
    let mut open = base_price;

    (0..len)
        .map(|i| {
            let trend = base_price + 0.5 * i as f64;
            let variation = 5.0 * ((i as f64 * 0.3 + seed as f64).sin() * 0.5 + 0.5);

            let close = trend + variation;
            let high = (close + 0.3 * variation).max(open);
            let low = (close - 0.3 * variation).min(open);
            let volume = 1000.0 + 500.0 * (i as f64 * 0.2).sin().abs();

            let candle = Candle::from((open, high, low, close, volume));
            open = close;
            candle
        })
        .collect()
}

struct TrendWithExits {
    ema: Ema,
    rsi: Rsi,
}

impl Strategy for TrendWithExits {
    fn indicators(&mut self) -> Vec<&mut dyn Indicator> {
        vec![&mut self.ema as &mut dyn Indicator, &mut self.rsi]
    }

    fn collect_orders(&mut self, market: &Market<'_>) -> Result<Vec<Order>> {
        if market.phase() != Phase::Close || !market.positions().is_empty() {
            return Ok(Vec::new());
        }

        let close = market.close()?;
        let (Some(ema), Some(rsi)) = (market.indicator(&self.ema, 0), market.indicator(&self.rsi, 0)) else {
            return Ok(Vec::new());
        };

        // half of the cash, whole units only
        let size = (market.cash() / 2.0 / close).floor() as u64;
        if size > 0 && close > ema && rsi < 70.0 {
            let order = OpenOrder::new(size, PositionType::Long)?
                .take_profit(close * 1.06)
                .stop_loss(close * 0.98);
            return Ok(vec![order.into()]);
        }
        Ok(Vec::new())
    }
}

fn main() -> Result<()> {
    let candles = generate_sample_candles(3000, 42, 100.0);
    let first_price = candles[0].open();
    let last_price = candles[candles.len() - 1].close();

    let initial_cash = 10_000.0;
    let config = BacktestConfig::default().with_money(initial_cash).with_spread(0.05);
    let mut backtest = Backtest::new(Data::new(candles)?, config)?;
    let mut strategy = TrendWithExits {
        ema: Ema::new(100)?,
        rsi: Rsi::new(14)?,
    };

    backtest.run(&mut strategy)?;
    println!("{}", backtest.statistics());

    let buy_and_hold = initial_cash / first_price * last_price;
    println!("buy and hold {buy_and_hold:.2}");

    Ok(())
}
