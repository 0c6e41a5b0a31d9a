use chrono::{DateTime, Utc};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::PositionType;

/// Immutable record of a fill.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trade {
    /// A position was opened.
    Open {
        /// Direction of the new position.
        position_type: PositionType,
        /// Candle timestamp of the fill.
        timestamp: Option<DateTime<Utc>>,
        /// Candle index of the fill.
        index: usize,
        /// Execution price (spread included).
        price: f64,
        /// Units bought or sold.
        size: u64,
        /// Filled at the current price rather than at a limit.
        market_order: bool,
    },
    /// A position was closed, fully or partially.
    Close {
        /// Direction of the closed position.
        position_type: PositionType,
        /// Timestamp of the candle that opened the position.
        open_time: Option<DateTime<Utc>>,
        /// Candle index that opened the position.
        open_index: usize,
        /// Opening price of the position.
        open_price: f64,
        /// Candle timestamp of the fill.
        close_time: Option<DateTime<Utc>>,
        /// Candle index of the fill.
        close_index: usize,
        /// Execution price (spread included).
        close_price: f64,
        /// Units closed.
        size: u64,
        /// Filled at the current price rather than at a limit or trigger.
        market_order: bool,
    },
}

impl Trade {
    /// Returns the units traded.
    pub fn size(&self) -> u64 {
        match self {
            Self::Open { size, .. } | Self::Close { size, .. } => *size,
        }
    }

    /// Returns the direction of the position involved.
    pub fn position_type(&self) -> PositionType {
        match self {
            Self::Open { position_type, .. } | Self::Close { position_type, .. } => *position_type,
        }
    }

    /// Whether the trade opened a position.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Whether the trade was a market fill.
    pub fn is_market(&self) -> bool {
        match self {
            Self::Open { market_order, .. } | Self::Close { market_order, .. } => *market_order,
        }
    }

    /// Returns the execution price.
    pub fn price(&self) -> f64 {
        match self {
            Self::Open { price, .. } => *price,
            Self::Close { close_price, .. } => *close_price,
        }
    }

    /// Returns the candle index of the fill.
    pub fn index(&self) -> usize {
        match self {
            Self::Open { index, .. } => *index,
            Self::Close { close_index, .. } => *close_index,
        }
    }

    /// Gross profit of a close trade (commission excluded), `None` for opens.
    pub fn pnl(&self) -> Option<f64> {
        match self {
            Self::Open { .. } => None,
            Self::Close {
                position_type,
                open_price,
                close_price,
                size,
                ..
            } => {
                let size = *size as f64;
                Some(match position_type {
                    PositionType::Long => size * (close_price - open_price),
                    PositionType::Short => size * (open_price - close_price),
                })
            }
        }
    }
}

#[cfg(test)]
#[test]
fn close_trade_pnl() {
    let long = Trade::Close {
        position_type: PositionType::Long,
        open_time: None,
        open_index: 0,
        open_price: 18.0,
        close_time: None,
        close_index: 0,
        close_price: 19.0,
        size: 2,
        market_order: false,
    };
    assert_eq!(long.pnl(), Some(2.0));
    assert_eq!(long.size(), 2);
    assert!(!long.is_open());
    assert_eq!(long.price(), 19.0);

    let short = Trade::Close {
        position_type: PositionType::Short,
        open_time: None,
        open_index: 0,
        open_price: 18.0,
        close_time: None,
        close_index: 0,
        close_price: 17.0,
        size: 1,
        market_order: true,
    };
    assert_eq!(short.pnl(), Some(1.0));
}

#[cfg(test)]
#[test]
fn open_trade_has_no_pnl() {
    let open = Trade::Open {
        position_type: PositionType::Long,
        timestamp: None,
        index: 3,
        price: 85.0,
        size: 1,
        market_order: true,
    };
    assert!(open.pnl().is_none());
    assert!(open.is_open());
    assert!(open.is_market());
    assert_eq!(open.index(), 3);
}
