//! Run configuration.
//!
//! With the `serde` feature the configuration can be read from any serde format.
//! Every field is optional there and falls back to [`BacktestConfig::default`]:
//!
//! ```toml
//! money = 1000.0
//! spread = 0.01
//! position_mode = "distinct"
//!
//! [commission]
//! type = "minimum_relative"
//! minimum = 1.0
//! rate = 0.001
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::engine::{Commission, PositionMode};
use crate::errors::{Error, Result};

/// Options of a backtest run.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestConfig {
    /// Initial cash, must be strictly positive.
    pub money: f64,
    /// Half-spread charged against the trader on every fill.
    pub spread: f64,
    /// Fee model applied on both fills of a round trip.
    pub commission: Option<Commission>,
    /// How open orders map to positions.
    pub position_mode: PositionMode,
    /// Raise instead of dropping the unfilled part of an untargeted close.
    pub strict_close: bool,
    /// Risk-free return used by alpha.
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            money: 10_000.0,
            spread: 0.0,
            commission: None,
            position_mode: PositionMode::Distinct,
            strict_close: false,
            risk_free_rate: 0.0,
        }
    }
}

impl BacktestConfig {
    /// Sets the initial cash.
    pub fn with_money(mut self, money: f64) -> Self {
        self.money = money;
        self
    }

    /// Sets the spread.
    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = spread;
        self
    }

    /// Sets the commission model.
    pub fn with_commission(mut self, commission: Commission) -> Self {
        self.commission = Some(commission);
        self
    }

    /// Sets the position mode.
    pub fn with_position_mode(mut self, position_mode: PositionMode) -> Self {
        self.position_mode = position_mode;
        self
    }

    /// Enables or disables strict closing.
    pub fn with_strict_close(mut self, strict_close: bool) -> Self {
        self.strict_close = strict_close;
        self
    }

    /// Sets the risk-free rate.
    pub fn with_risk_free_rate(mut self, risk_free_rate: f64) -> Self {
        self.risk_free_rate = risk_free_rate;
        self
    }

    /// Checks every option.
    pub fn validate(&self) -> Result<()> {
        if self.money <= 0.0 || !self.money.is_finite() {
            return Err(Error::NegZeroBalance(self.money));
        }
        if self.spread < 0.0 || !self.spread.is_finite() {
            return Err(Error::NegSpread(self.spread));
        }
        if let Some(commission) = &self.commission {
            commission.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[test]
fn default_config_is_valid() {
    let config = BacktestConfig::default();
    assert_eq!(config.money, 10_000.0);
    assert_eq!(config.position_mode, PositionMode::Distinct);
    assert!(config.validate().is_ok());
}

#[cfg(test)]
#[test]
fn invalid_options() {
    let config = BacktestConfig::default().with_money(0.0);
    assert!(matches!(config.validate(), Err(Error::NegZeroBalance(_))));

    let config = BacktestConfig::default().with_spread(-1.0);
    assert!(matches!(config.validate(), Err(Error::NegSpread(_))));

    let config = BacktestConfig::default().with_commission(Commission::Fixed { fee: -2.0 });
    assert!(matches!(config.validate(), Err(Error::NegCommission(_))));
}
