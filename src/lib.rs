//! # candlebt: event-driven backtesting over OHLCV candles
//!
//! **candlebt** replays a fixed series of candles against a strategy and a
//! synthetic broker, producing a trade log, an equity curve and summary statistics.
//!
//! Each candle is visited twice: at its **OPEN**, when only the opening print is
//! known, and at its **CLOSE**, when the whole candle is. Stop-losses,
//! take-profits, strategy orders and queued limit orders are all evaluated
//! against what is observable at that instant, so a strategy cannot trade on
//! the candle's future.
//!
//! ## Core Components
//! | Component      | Description                                                                          |
//! |----------------|--------------------------------------------------------------------------------------|
//! | **`Candle`**   | One OHLCV observation, built from tuples or a validating builder.                   |
//! | **`Data`**     | The candle series and the clock (index and phase); loads CSV files.                 |
//! | **`Order`**    | Open or close, market or limit; opens may carry a stop-loss and a take-profit.      |
//! | **`Position`** | Open exposure with a stable id, closed fully or partially.                          |
//! | **`Trade`**    | Append-only log of open and close fills.                                            |
//! | **`Account`**  | Cash plus the per-candle assets value and equity series.                            |
//! | **`Broker`**   | Order matching, triggers, spread and commission.                                    |
//! | **`Backtest`** | The driver walking the candles.                                                     |
//! | **`Statistics`** | Trade counts, drawdown, alpha/beta, win rate, profit factor.                      |
//!
//! ## Order Matching
//! | Order                | Fill                                                                           |
//! |----------------------|--------------------------------------------------------------------------------|
//! | **Market**           | At the current price (open or close), spread against the trader.              |
//! | **Limit**            | Queued until the limit is reachable, at the limit or better.                  |
//! | **Stop-Loss**        | Checked first in every phase; gaps fill at the open.                          |
//! | **Take-Profit**      | Checked after the stop-losses.                                                 |
//! | **Update**           | Moves a position's stop-loss or take-profit, before the batch's closes.       |
//!
//! Within a batch, close orders run before open orders so that released cash
//! can fund new positions. An open that cannot be paid for is skipped.
//!
//! ## Getting Started
//! ```rust
//! use candlebt::prelude::*;
//!
//! let candles = vec![
//!     Candle::from((18.0, 19.5, 15.0, 19.5)),
//!     Candle::from((19.5, 21.0, 19.0, 20.0)),
//! ];
//! let data = Data::new(candles).unwrap();
//! let config = BacktestConfig::default().with_money(100.0);
//! let mut backtest = Backtest::new(data, config).unwrap();
//!
//! // Buy one unit at the first open with a take-profit one point higher
//! let mut strategy = strategy::from_fn(|market| {
//!     if market.index() == 0 && market.phase() == Phase::Open {
//!         let order = OpenOrder::new(1, PositionType::Long)?.take_profit(market.open() + 1.0);
//!         return Ok(vec![order.into()]);
//!     }
//!     Ok(Vec::new())
//! });
//!
//! backtest.run(&mut strategy).unwrap();
//! assert_eq!(backtest.trades().len(), 2);
//! assert_eq!(backtest.final_equity(), 101.0);
//!
//! println!("{}", backtest.statistics());
//! ```
//!
//! ## Features
//! | Feature  | Purpose                                                                    |
//! |----------|----------------------------------------------------------------------------|
//! | `serde`  | Serialize/deserialize value types, statistics and the configuration.      |
//! | `draws`  | Candle, trade and equity charts with [`plotters`](https://crates.io/crates/plotters). |
//! | `cli`    | The `candlebt` command-line runner.                                        |
//!
//! ## Logging
//! The engine reports through [`tracing`](https://crates.io/crates/tracing): run
//! summaries at `info`, every fill, skipped open and trigger at `debug`. Install
//! any subscriber to see them.
#![warn(missing_docs)]

/// Core engine: candles, orders, positions, broker and the backtest driver.
pub mod engine;

/// Error types for the library.
pub mod errors;

/// Backtest configuration.
pub mod config;

/// Strategies and the market view they observe.
pub mod strategy;

/// Technical indicators: SMA, EMA, RSI.
pub mod indicators;

/// Performance statistics: drawdown, alpha, beta, win rate, etc.
pub mod metrics;

/// Draw charts to SVG or PNG.
#[cfg(feature = "draws")]
pub mod draws;

pub use config::BacktestConfig;

/// Re-exports of commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::config::*;
    pub use crate::engine::*;
    pub use crate::errors::*;
    pub use crate::indicators::*;
    pub use crate::metrics::*;
    pub use crate::strategy::{self, Market, SmaCross, Strategy};

    #[cfg(feature = "draws")]
    pub use crate::draws::*;
}
