#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{Position, PositionId, PositionType};
use crate::errors::{Error, Result};

/// A request to open a new position.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenOrder {
    size: u64,
    position_type: PositionType,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    limit_price: Option<f64>,
}

impl OpenOrder {
    /// Market order for `size` units in the given direction.
    pub fn new(size: u64, position_type: PositionType) -> Result<Self> {
        if size == 0 {
            return Err(Error::ZeroOrderSize);
        }
        Ok(Self {
            size,
            position_type,
            stop_loss: None,
            take_profit: None,
            limit_price: None,
        })
    }

    /// Attaches a stop-loss trigger to the position this order opens.
    pub fn stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    /// Attaches a take-profit trigger to the position this order opens.
    pub fn take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }

    /// Turns the order into a limit order.
    pub fn limit(mut self, price: f64) -> Self {
        self.limit_price = Some(price);
        self
    }

    /// Returns the number of units.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the direction.
    pub fn position_type(&self) -> PositionType {
        self.position_type
    }

    /// Returns the stop-loss trigger.
    pub fn stop_loss_price(&self) -> Option<f64> {
        self.stop_loss
    }

    /// Returns the take-profit trigger.
    pub fn take_profit_price(&self) -> Option<f64> {
        self.take_profit
    }

    /// Returns the limit price of a limit order.
    pub fn limit_price(&self) -> Option<f64> {
        self.limit_price
    }
}

/// A request to close exposure, either a given position or by direction (FIFO).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloseOrder {
    size: u64,
    position_type: PositionType,
    target: Option<PositionId>,
    limit_price: Option<f64>,
}

impl CloseOrder {
    /// Builds a close order from a direction, a target position, or both.
    ///
    /// With a target, the direction is taken from the position.
    pub fn new(size: u64, position_type: Option<PositionType>, position: Option<&Position>) -> Result<Self> {
        if size == 0 {
            return Err(Error::ZeroOrderSize);
        }
        let (position_type, target) = match (position, position_type) {
            (Some(position), _) => (position.position_type(), Some(position.id())),
            (None, Some(position_type)) => (position_type, None),
            (None, None) => return Err(Error::CloseOrderWithoutTarget),
        };
        Ok(Self {
            size,
            position_type,
            target,
            limit_price: None,
        })
    }

    /// Closes `size` units of the oldest positions in `position_type`.
    pub fn by_type(size: u64, position_type: PositionType) -> Result<Self> {
        Self::new(size, Some(position_type), None)
    }

    /// Closes `size` units of `position`.
    pub fn position(size: u64, position: &Position) -> Result<Self> {
        Self::new(size, None, Some(position))
    }

    /// Closes the whole of `position`.
    pub fn all(position: &Position) -> Result<Self> {
        Self::new(position.size(), None, Some(position))
    }

    /// Turns the order into a limit order.
    pub fn limit(mut self, price: f64) -> Self {
        self.limit_price = Some(price);
        self
    }

    /// Returns the number of units.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the direction of the exposure being closed.
    pub fn position_type(&self) -> PositionType {
        self.position_type
    }

    /// Returns the targeted position, if any.
    pub fn target(&self) -> Option<PositionId> {
        self.target
    }

    /// Returns the limit price of a limit order.
    pub fn limit_price(&self) -> Option<f64> {
        self.limit_price
    }
}

/// A request to move the stop-loss and take-profit of an open position.
///
/// Starts from the position's current triggers, so only the ones set here change.
/// It applies immediately and the new triggers are checked from the next phase on.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOrder {
    target: PositionId,
    position_type: PositionType,
    size: u64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

impl UpdateOrder {
    /// Update of `position`, keeping its triggers until changed.
    pub fn new(position: &Position) -> Self {
        Self {
            target: position.id(),
            position_type: position.position_type(),
            size: position.size(),
            stop_loss: position.stop_loss(),
            take_profit: position.take_profit(),
        }
    }

    /// Sets the stop-loss; `None` removes it.
    pub fn stop_loss(mut self, price: Option<f64>) -> Self {
        self.stop_loss = price;
        self
    }

    /// Sets the take-profit; `None` removes it.
    pub fn take_profit(mut self, price: Option<f64>) -> Self {
        self.take_profit = price;
        self
    }

    /// Returns the targeted position.
    pub fn target(&self) -> PositionId {
        self.target
    }

    /// Returns the stop-loss the position will carry.
    pub fn stop_loss_price(&self) -> Option<f64> {
        self.stop_loss
    }

    /// Returns the take-profit the position will carry.
    pub fn take_profit_price(&self) -> Option<f64> {
        self.take_profit
    }
}

/// An order submitted by a strategy.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Order {
    /// Opens a position.
    Open(OpenOrder),
    /// Closes exposure.
    Close(CloseOrder),
    /// Moves the triggers of an open position.
    Update(UpdateOrder),
}

impl From<OpenOrder> for Order {
    fn from(value: OpenOrder) -> Self {
        Self::Open(value)
    }
}

impl From<CloseOrder> for Order {
    fn from(value: CloseOrder) -> Self {
        Self::Close(value)
    }
}

impl From<UpdateOrder> for Order {
    fn from(value: UpdateOrder) -> Self {
        Self::Update(value)
    }
}

impl Order {
    /// Returns the number of units; for an update, the size of the position when it was built.
    pub fn size(&self) -> u64 {
        match self {
            Self::Open(order) => order.size(),
            Self::Close(order) => order.size(),
            Self::Update(order) => order.size,
        }
    }

    /// Returns the direction.
    pub fn position_type(&self) -> PositionType {
        match self {
            Self::Open(order) => order.position_type(),
            Self::Close(order) => order.position_type(),
            Self::Update(order) => order.position_type,
        }
    }

    /// Returns the limit price, `None` for market orders and updates.
    pub fn limit_price(&self) -> Option<f64> {
        match self {
            Self::Open(order) => order.limit_price(),
            Self::Close(order) => order.limit_price(),
            Self::Update(_) => None,
        }
    }

    /// Whether the order executes at the current price.
    pub fn is_market_type(&self) -> bool {
        self.limit_price().is_none()
    }
}

#[cfg(test)]
#[test]
fn create_market_open() {
    let order: Order = OpenOrder::new(2, PositionType::Long)
        .unwrap()
        .stop_loss(90.0)
        .take_profit(120.0)
        .into();

    assert_eq!(order.size(), 2);
    assert_eq!(order.position_type(), PositionType::Long);
    assert!(order.is_market_type());
    let Order::Open(open) = order else {
        panic!("Expected an open order");
    };
    assert_eq!(open.stop_loss_price(), Some(90.0));
    assert_eq!(open.take_profit_price(), Some(120.0));
}

#[cfg(test)]
#[test]
fn create_limit_open() {
    let order: Order = OpenOrder::new(1, PositionType::Short).unwrap().limit(150.0).into();
    assert!(!order.is_market_type());
    assert_eq!(order.limit_price(), Some(150.0));
}

#[cfg(test)]
#[test]
fn zero_size_is_rejected() {
    assert!(matches!(OpenOrder::new(0, PositionType::Long), Err(Error::ZeroOrderSize)));
    assert!(matches!(CloseOrder::by_type(0, PositionType::Long), Err(Error::ZeroOrderSize)));
}

#[cfg(test)]
#[test]
fn close_order_needs_a_target() {
    let result = CloseOrder::new(1, None, None);
    assert!(matches!(result, Err(Error::CloseOrderWithoutTarget)));
}

#[cfg(test)]
#[test]
fn close_order_takes_type_from_position() {
    let position = Position::new(PositionId(7), PositionType::Short, 18.0, 3, None, 0);
    let order = CloseOrder::new(2, Some(PositionType::Long), Some(&position)).unwrap();
    assert_eq!(order.position_type(), PositionType::Short);
    assert_eq!(order.target(), Some(PositionId(7)));

    let order = CloseOrder::all(&position).unwrap();
    assert_eq!(order.size(), 3);
}

#[cfg(test)]
#[test]
fn update_order_keeps_unset_triggers() {
    let position = Position::new(PositionId(3), PositionType::Long, 20.0, 2, None, 0).with_triggers(Some(18.0), Some(25.0));
    let order: Order = UpdateOrder::new(&position).stop_loss(Some(19.0)).into();

    assert!(order.is_market_type());
    assert_eq!(order.size(), 2);
    let Order::Update(update) = order else {
        panic!("Expected an update order");
    };
    assert_eq!(update.target(), PositionId(3));
    assert_eq!(update.stop_loss_price(), Some(19.0));
    assert_eq!(update.take_profit_price(), Some(25.0));

    let cleared = UpdateOrder::new(&position).take_profit(None);
    assert_eq!(cleared.stop_loss_price(), Some(18.0));
    assert_eq!(cleared.take_profit_price(), None);
}
