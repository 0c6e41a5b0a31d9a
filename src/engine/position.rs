use std::fmt;

use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Direction of an exposure.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionType {
    /// Profits when the price rises.
    Long,
    /// Profits when the price falls.
    Short,
}

impl fmt::Display for PositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Identity of a position, assigned by the broker when the position opens.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionId(pub(crate) u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single open exposure.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    id: PositionId,
    position_type: PositionType,
    open_price: f64,
    size: u64,
    open_time: Option<DateTime<Utc>>,
    open_index: usize,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

impl Position {
    pub(crate) fn new(
        id: PositionId,
        position_type: PositionType,
        open_price: f64,
        size: u64,
        open_time: Option<DateTime<Utc>>,
        open_index: usize,
    ) -> Self {
        Self {
            id,
            position_type,
            open_price,
            size,
            open_time,
            open_index,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub(crate) fn with_triggers(mut self, stop_loss: Option<f64>, take_profit: Option<f64>) -> Self {
        self.stop_loss = stop_loss;
        self.take_profit = take_profit;
        self
    }

    /// Returns the position id.
    pub fn id(&self) -> PositionId {
        self.id
    }

    /// Returns the direction.
    pub fn position_type(&self) -> PositionType {
        self.position_type
    }

    /// Returns the (spread-adjusted) opening price.
    pub fn open_price(&self) -> f64 {
        self.open_price
    }

    /// Returns the number of units held.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the timestamp of the opening candle.
    pub fn open_time(&self) -> Option<DateTime<Utc>> {
        self.open_time
    }

    /// Returns the index of the opening candle.
    pub fn open_index(&self) -> usize {
        self.open_index
    }

    /// Returns the stop-loss trigger.
    pub fn stop_loss(&self) -> Option<f64> {
        self.stop_loss
    }

    /// Returns the take-profit trigger.
    pub fn take_profit(&self) -> Option<f64> {
        self.take_profit
    }

    /// Replaces the stop-loss trigger (`None` removes it).
    pub fn update_stop_loss(&mut self, price: Option<f64>) {
        self.stop_loss = price;
    }

    /// Replaces the take-profit trigger (`None` removes it).
    pub fn update_take_profit(&mut self, price: Option<f64>) {
        self.take_profit = price;
    }

    /// Marks the position at `price`.
    ///
    /// A short is valued symmetrically to a long about its open price: `size * (2 * open - price)`.
    pub fn value_at(&self, price: f64) -> f64 {
        self.proceeds(self.size, price)
    }

    /// Cash released by closing `size` units at `price`, before commission.
    pub(crate) fn proceeds(&self, size: u64, price: f64) -> f64 {
        let size = size as f64;
        match self.position_type {
            PositionType::Long => size * price,
            PositionType::Short => size * (2.0 * self.open_price - price),
        }
    }

    /// Gross profit of closing `size` units at `price`.
    pub fn estimate_pnl(&self, size: u64, price: f64) -> f64 {
        let size = size as f64;
        match self.position_type {
            PositionType::Long => size * (price - self.open_price),
            PositionType::Short => size * (self.open_price - price),
        }
    }

    /// Nets `size` more units bought at `price` into this position.
    ///
    /// The open price becomes the size-weighted average; triggers given here replace the current ones.
    pub(crate) fn accumulate(&mut self, size: u64, price: f64, stop_loss: Option<f64>, take_profit: Option<f64>) {
        let total = self.size + size;
        self.open_price = (self.size as f64 * self.open_price + size as f64 * price) / total as f64;
        self.size = total;
        if stop_loss.is_some() {
            self.stop_loss = stop_loss;
        }
        if take_profit.is_some() {
            self.take_profit = take_profit;
        }
    }

    /// Returns the position left after removing `n` units, or `None` when nothing remains.
    pub fn reduce(&self, n: u64) -> Result<Option<Self>> {
        if n > self.size {
            return Err(Error::CloseSizeExceedsPosition {
                id: self.id,
                requested: n,
                available: self.size,
            });
        }
        if n == self.size {
            return Ok(None);
        }
        Ok(Some(Self {
            size: self.size - n,
            ..self.clone()
        }))
    }
}

#[cfg(test)]
fn position(position_type: PositionType, open_price: f64, size: u64) -> Position {
    Position::new(PositionId(1), position_type, open_price, size, None, 0)
}

#[cfg(test)]
#[test]
fn long_value() {
    let long = position(PositionType::Long, 18.0, 2);
    assert_eq!(long.value_at(20.0), 40.0);
    assert_eq!(long.estimate_pnl(2, 20.0), 4.0);
}

#[cfg(test)]
#[test]
fn short_value_mirrors_long() {
    let short = position(PositionType::Short, 18.0, 1);
    assert_eq!(short.value_at(18.0), 18.0);
    assert_eq!(short.value_at(17.0), 19.0);
    assert_eq!(short.estimate_pnl(1, 17.0), 1.0);
    // marks below zero once the price doubles past the open
    assert_eq!(short.value_at(40.0), -4.0);
}

#[cfg(test)]
#[test]
fn reduce_partial_and_full() {
    let long = position(PositionType::Long, 25.0, 4);
    let reduced = long.reduce(1).unwrap().unwrap();
    assert_eq!(reduced.size(), 3);
    assert_eq!(reduced.open_price(), 25.0);
    assert_eq!(reduced.id(), long.id());

    assert!(reduced.reduce(3).unwrap().is_none());
}

#[cfg(test)]
#[test]
fn reduce_too_much() {
    let long = position(PositionType::Long, 25.0, 2);
    let result = long.reduce(3);
    assert!(matches!(
        result,
        Err(Error::CloseSizeExceedsPosition {
            requested: 3,
            available: 2,
            ..
        })
    ));
}

#[cfg(test)]
#[test]
fn accumulate_weights_open_price() {
    let mut long = position(PositionType::Long, 10.0, 1).with_triggers(Some(8.0), None);
    long.accumulate(3, 14.0, None, Some(20.0));
    assert_eq!(long.size(), 4);
    assert_eq!(long.open_price(), 13.0);
    assert_eq!(long.stop_loss(), Some(8.0));
    assert_eq!(long.take_profit(), Some(20.0));
}

#[cfg(test)]
#[test]
fn update_triggers() {
    let mut long = position(PositionType::Long, 25.0, 2).with_triggers(Some(20.0), None);
    assert_eq!(long.stop_loss(), Some(20.0));
    long.update_stop_loss(Some(24.0));
    long.update_take_profit(Some(30.0));
    assert_eq!(long.stop_loss(), Some(24.0));
    assert_eq!(long.take_profit(), Some(30.0));
    long.update_stop_loss(None);
    assert!(long.stop_loss().is_none());
}
