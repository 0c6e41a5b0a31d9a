//! Core simulation components.
//!
//! This module provides the fundamental types for backtesting:
//! - `Candle` / `Data`: OHLCV series and the clock walking through it.
//! - `Order`: Market and limit orders, opening or closing exposure.
//! - `Position`: Open exposure with optional stop-loss and take-profit.
//! - `Trade`: The fill log.
//! - `Account`: Cash, assets value and equity per candle.
//! - `Broker`: Order matching, spread and commission.
//! - `Backtest`: The driver.

mod account;
mod backtest;
mod broker;
mod candle;
mod data;
mod order;
mod position;
mod trade;

pub use account::*;
pub use backtest::*;
pub use broker::*;
pub use candle::*;
pub use data::*;
pub use order::*;
pub use position::*;
pub use trade::*;
