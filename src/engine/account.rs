#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Cash balance plus the per-candle assets value and equity series.
///
/// `equity[0]` is the initial cash and `equity[i + 1]` the equity after candle `i`.
/// Over-draft prevention is the broker's job: no operation here fails.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Account {
    // Initial cash used for reset
    initial_cash: f64,
    // Available cash
    cash: f64,
    // Mark-to-market value of open positions, one slot per candle
    assets_value: Vec<f64>,
    // Cash + assets value, one slot per candle plus the initial one
    equity: Vec<f64>,
    // Last candle whose equity was written
    last_finalized: Option<usize>,
}

impl Account {
    /// Creates an account for `len` candles. Non-positive cash is rejected.
    pub fn new(len: usize, initial_cash: f64) -> Result<Self> {
        if initial_cash <= 0.0 || !initial_cash.is_finite() {
            return Err(Error::NegZeroBalance(initial_cash));
        }

        let mut equity = vec![0.0; len + 1];
        equity[0] = initial_cash;
        Ok(Self {
            initial_cash,
            cash: initial_cash,
            assets_value: vec![0.0; len],
            equity,
            last_finalized: None,
        })
    }

    /// Returns the initial cash.
    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    /// Returns the available cash.
    pub fn current_cash(&self) -> f64 {
        self.cash
    }

    /// Whether the available cash covers `amount`.
    pub fn has_at_least(&self, amount: f64) -> bool {
        self.cash >= amount
    }

    /// Adds a signed amount to the cash.
    pub(crate) fn credit(&mut self, delta: f64) {
        self.cash += delta;
    }

    pub(crate) fn set_assets_value(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.assets_value.get_mut(index) {
            *slot = value;
        }
    }

    /// Writes `equity[index + 1] = cash + assets_value[index]`.
    pub(crate) fn finalize_equity(&mut self, index: usize) {
        let Some(assets) = self.assets_value.get(index).copied() else {
            return;
        };
        self.equity[index + 1] = self.cash + assets;
        self.last_finalized = Some(index);
    }

    /// Equity after the last finalized candle, or the initial cash.
    pub fn final_equity(&self) -> f64 {
        self.last_finalized
            .map_or(self.initial_cash, |index| self.equity[index + 1])
    }

    /// Assets value after the last finalized candle.
    pub fn final_assets_value(&self) -> f64 {
        self.last_finalized.map_or(0.0, |index| self.assets_value[index])
    }

    /// Returns the equity series (length N + 1).
    pub fn equity_series(&self) -> &[f64] {
        &self.equity
    }

    /// Returns the assets value series (length N).
    pub fn assets_series(&self) -> &[f64] {
        &self.assets_value
    }

    /// Final equity minus initial cash.
    pub fn return_value(&self) -> f64 {
        self.final_equity() - self.initial_cash
    }

    /// Resets the account to its initial cash and clears both series.
    pub(crate) fn reset(&mut self) {
        self.cash = self.initial_cash;
        self.assets_value.iter_mut().for_each(|v| *v = 0.0);
        self.equity.iter_mut().skip(1).for_each(|v| *v = 0.0);
        self.last_finalized = None;
    }
}

#[cfg(test)]
#[test]
fn new_account_valid_cash() {
    let account = Account::new(3, 100.0).unwrap();
    assert_eq!(account.current_cash(), 100.0);
    assert_eq!(account.equity_series(), &[100.0, 0.0, 0.0, 0.0]);
    assert_eq!(account.assets_series().len(), 3);
    assert_eq!(account.final_equity(), 100.0);
}

#[cfg(test)]
#[test]
fn new_account_invalid_cash() {
    let result = Account::new(3, 0.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));

    let result = Account::new(3, -10.0);
    assert!(matches!(result, Err(Error::NegZeroBalance(_))));
}

#[cfg(test)]
#[test]
fn credit_and_has_at_least() {
    let mut account = Account::new(1, 100.0).unwrap();
    assert!(account.has_at_least(100.0));
    assert!(!account.has_at_least(100.01));

    account.credit(-18.0);
    assert_eq!(account.current_cash(), 82.0);
    account.credit(19.0);
    assert_eq!(account.current_cash(), 101.0);
}

#[cfg(test)]
#[test]
fn finalize_equity_adds_assets() {
    let mut account = Account::new(2, 100.0).unwrap();
    account.credit(-18.0);
    account.set_assets_value(0, 17.5);
    account.finalize_equity(0);
    assert_eq!(account.equity_series()[1], 99.5);
    assert_eq!(account.final_equity(), 99.5);
    assert_eq!(account.final_assets_value(), 17.5);
    assert_eq!(account.return_value(), -0.5);

    // out of range writes are ignored
    account.set_assets_value(5, 1.0);
    account.finalize_equity(5);
    assert_eq!(account.final_equity(), 99.5);
}

#[cfg(test)]
#[test]
fn reset_account() {
    let mut account = Account::new(2, 100.0).unwrap();
    account.credit(-50.0);
    account.set_assets_value(0, 40.0);
    account.finalize_equity(0);

    account.reset();
    assert_eq!(account.current_cash(), 100.0);
    assert_eq!(account.equity_series(), &[100.0, 0.0, 0.0]);
    assert_eq!(account.final_equity(), 100.0);
}
