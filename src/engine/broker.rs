use std::collections::{VecDeque, vec_deque::Iter};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{Account, CloseOrder, Data, OpenOrder, Order, Position, PositionId, PositionType, Trade};
use crate::errors::{Error, Result};

/// Fee charged on every fill, debited from cash.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Commission {
    /// `rate * notional`.
    Relative {
        /// Fraction of the notional (e.g. 0.001 for 0.1%).
        rate: f64,
    },
    /// `max(minimum, rate * notional)`.
    MinimumRelative {
        /// Floor of the fee.
        minimum: f64,
        /// Fraction of the notional.
        rate: f64,
    },
    /// Flat fee per fill.
    Fixed {
        /// Fee amount.
        fee: f64,
    },
}

impl Commission {
    /// Fee for a fill of the given notional.
    pub fn fee(&self, notional: f64) -> f64 {
        match *self {
            Self::Relative { rate } => rate * notional,
            Self::MinimumRelative { minimum, rate } => minimum.max(rate * notional),
            Self::Fixed { fee } => fee,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let params = match *self {
            Self::Relative { rate } => [rate, 0.0],
            Self::MinimumRelative { minimum, rate } => [minimum, rate],
            Self::Fixed { fee } => [fee, 0.0],
        };
        match params.into_iter().find(|p| *p < 0.0 || !p.is_finite()) {
            Some(bad) => Err(Error::NegCommission(bad)),
            None => Ok(()),
        }
    }
}

/// How open orders map to positions.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionMode {
    /// Every open creates its own position.
    #[default]
    Distinct,
    /// Long opens are netted into a single position; shorts are refused.
    Accumulate,
}

/// Order-matching engine.
///
/// Owns the open positions, the trade log and the queue of pending limit orders.
/// Every operation runs against the phase-dependent view of [`Data`]: during the
/// OPEN phase the only observable price is the open.
#[derive(Debug, Clone)]
pub struct Broker {
    spread: f64,
    commission: Option<Commission>,
    position_mode: PositionMode,
    strict_close: bool,
    next_id: u64,
    positions: Vec<Position>,
    trades: Vec<Trade>,
    limit_orders: VecDeque<Order>,
    commission_paid: f64,
}

impl Broker {
    /// Creates a broker.
    ///
    /// ### Arguments
    /// * `spread` - Cost added to every fill against the trader, must not be negative.
    /// * `commission` - Optional fee charged on both the open and the close fill.
    pub fn new(spread: f64, commission: Option<Commission>) -> Result<Self> {
        if spread < 0.0 || !spread.is_finite() {
            return Err(Error::NegSpread(spread));
        }
        if let Some(commission) = &commission {
            commission.validate()?;
        }

        Ok(Self {
            spread,
            commission,
            position_mode: PositionMode::Distinct,
            strict_close: false,
            next_id: 0,
            positions: Vec::new(),
            trades: Vec::new(),
            limit_orders: VecDeque::new(),
            commission_paid: 0.0,
        })
    }

    /// Sets the position mode.
    pub fn with_position_mode(mut self, position_mode: PositionMode) -> Self {
        self.position_mode = position_mode;
        self
    }

    /// Raise instead of dropping the part of an untargeted close that exceeds the open exposure.
    pub fn with_strict_close(mut self, strict_close: bool) -> Self {
        self.strict_close = strict_close;
        self
    }

    /// Returns the spread.
    pub fn spread(&self) -> f64 {
        self.spread
    }

    /// Returns the commission model.
    pub fn commission(&self) -> Option<&Commission> {
        self.commission.as_ref()
    }

    /// Returns the open positions, oldest first.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Returns the trade log in fill order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Returns an iterator over the queued limit orders.
    pub fn pending_orders(&self) -> Iter<'_, Order> {
        self.limit_orders.iter()
    }

    /// Returns the total commission paid.
    pub fn commission_paid(&self) -> f64 {
        self.commission_paid
    }

    /// Mark-to-market value of every open position at the current price.
    pub fn assets_value(&self, data: &Data) -> f64 {
        let price = data.current_price();
        self.positions.iter().map(|p| p.value_at(price)).sum()
    }

    /// Replaces the stop-loss of an open position.
    pub fn update_stop_loss(&mut self, id: PositionId, price: Option<f64>) -> Result<()> {
        self.position_mut(id)?.update_stop_loss(price);
        Ok(())
    }

    /// Replaces the take-profit of an open position.
    pub fn update_take_profit(&mut self, id: PositionId, price: Option<f64>) -> Result<()> {
        self.position_mut(id)?.update_take_profit(price);
        Ok(())
    }

    /// Handles the strategy's batch for the current phase.
    ///
    /// Trigger updates run first, then close orders, then open orders, so that
    /// released cash can fund the opens; within each group the input order is kept.
    /// Limit orders are queued and only matched by [`Broker::process_limit_orders`].
    pub fn process_new_orders(&mut self, data: &Data, account: &mut Account, mut orders: Vec<Order>) -> Result<()> {
        orders.sort_by_key(|order| match order {
            Order::Update(_) => 0,
            Order::Close(_) => 1,
            Order::Open(_) => 2,
        });

        for order in orders {
            if !order.is_market_type() {
                trace!(index = data.index(), phase = %data.phase(), ?order, "limit order queued");
                self.limit_orders.push_back(order);
                continue;
            }

            match order {
                Order::Open(open) => {
                    let price = self.open_price(open.position_type(), data.current_price());
                    self.open_position(data, account, &open, price, true)?;
                }
                Order::Close(close) => {
                    let price = self.close_price(close.position_type(), data.current_price());
                    self.close_exposure(data, account, &close, price, true)?;
                }
                Order::Update(update) => {
                    let id = update.target();
                    self.update_stop_loss(id, update.stop_loss_price())?;
                    self.update_take_profit(id, update.take_profit_price())?;
                    debug!(
                        index = data.index(),
                        phase = %data.phase(),
                        %id,
                        stop_loss = ?update.stop_loss_price(),
                        take_profit = ?update.take_profit_price(),
                        "triggers updated"
                    );
                }
            }
        }
        Ok(())
    }

    /// Closes every position whose stop-loss is reachable in the current phase.
    ///
    /// The trigger is compared with the spread-adjusted range; the fill is the trigger
    /// clamped to the raw range, so a gap fills at the open.
    pub fn process_stop_losses(&mut self, data: &Data, account: &mut Account) -> Result<()> {
        self.process_triggers(data, account, |broker, position| {
            let stop = position.stop_loss()?;
            let position_type = position.position_type();
            match position_type {
                PositionType::Long => {
                    (stop >= broker.close_price(position_type, data.current_low())).then(|| data.current_high().min(stop))
                }
                PositionType::Short => {
                    (stop <= broker.close_price(position_type, data.current_high())).then(|| data.current_low().max(stop))
                }
            }
        })
    }

    /// Closes every position whose take-profit is reachable in the current phase.
    pub fn process_take_profits(&mut self, data: &Data, account: &mut Account) -> Result<()> {
        self.process_triggers(data, account, |broker, position| {
            let take = position.take_profit()?;
            let position_type = position.position_type();
            match position_type {
                PositionType::Long => {
                    (take <= broker.close_price(position_type, data.current_high())).then(|| data.current_low().max(take))
                }
                PositionType::Short => {
                    (take >= broker.close_price(position_type, data.current_low())).then(|| data.current_high().min(take))
                }
            }
        })
    }

    /// Tries every queued limit order against the current phase; unmatched orders stay queued.
    pub fn process_limit_orders(&mut self, data: &Data, account: &mut Account) -> Result<()> {
        let mut orders = VecDeque::with_capacity(self.limit_orders.len());
        while let Some(order) = self.limit_orders.pop_front() {
            //? the target may have been closed by a trigger or another order meanwhile
            if let Order::Close(close) = &order
                && let Some(id) = close.target()
                && self.position_index(id).is_none()
            {
                debug!(index = data.index(), %id, "limit close dropped, position is gone");
                continue;
            }

            let Some(price) = self.limit_fill(&order, data) else {
                orders.push_back(order);
                continue;
            };

            match order {
                Order::Open(open) => {
                    self.open_position(data, account, &open, price, false)?;
                }
                Order::Close(close) => {
                    self.close_exposure(data, account, &close, price, false)?;
                }
                Order::Update(_) => {}
            }
        }
        self.limit_orders.append(&mut orders);
        Ok(())
    }

    /// Resets the broker to its initial state.
    pub(crate) fn reset(&mut self) {
        self.next_id = 0;
        self.commission_paid = 0.0;
        self.positions = Vec::new();
        self.trades = Vec::new();
        self.limit_orders = VecDeque::new();
    }

    /// Price paid when opening (spread against the trader).
    fn open_price(&self, position_type: PositionType, raw: f64) -> f64 {
        match position_type {
            PositionType::Long => raw + self.spread,
            PositionType::Short => raw - self.spread,
        }
    }

    /// Price received when closing (spread against the trader).
    fn close_price(&self, position_type: PositionType, raw: f64) -> f64 {
        match position_type {
            PositionType::Long => raw - self.spread,
            PositionType::Short => raw + self.spread,
        }
    }

    fn fee(&self, notional: f64) -> f64 {
        self.commission.map_or(0.0, |c| c.fee(notional))
    }

    fn position_index(&self, id: PositionId) -> Option<usize> {
        self.positions.iter().position(|p| p.id() == id)
    }

    fn position_mut(&mut self, id: PositionId) -> Result<&mut Position> {
        self.positions
            .iter_mut()
            .find(|p| p.id() == id)
            .ok_or(Error::PositionNotFound(id))
    }

    /// Fill price of a limit order if it is admissible in the current phase.
    ///
    /// Admissibility uses the spread-adjusted price, the fill clamps the limit to the raw range.
    fn limit_fill(&self, order: &Order, data: &Data) -> Option<f64> {
        let limit = order.limit_price()?;
        let position_type = order.position_type();
        let price = data.current_price();
        let (low, high) = (data.current_low(), data.current_high());
        match (order, position_type) {
            (Order::Open(_), PositionType::Long) => (limit >= self.open_price(position_type, price)).then(|| high.min(limit)),
            (Order::Open(_), PositionType::Short) => (limit <= self.open_price(position_type, price)).then(|| low.max(limit)),
            (Order::Close(_), PositionType::Long) => (limit <= self.close_price(position_type, price)).then(|| low.max(limit)),
            (Order::Close(_), PositionType::Short) => (limit >= self.close_price(position_type, price)).then(|| high.min(limit)),
            (Order::Update(_), _) => None,
        }
    }

    /// Walks the positions in insertion order and fully closes those for which `fill` yields a price.
    fn process_triggers<F>(&mut self, data: &Data, account: &mut Account, fill: F) -> Result<()>
    where
        F: Fn(&Self, &Position) -> Option<f64>,
    {
        let mut index = 0;
        while index < self.positions.len() {
            let position = &self.positions[index];
            match fill(self, position) {
                Some(price) => {
                    let size = position.size();
                    debug!(
                        index = data.index(),
                        phase = %data.phase(),
                        id = %position.id(),
                        stop_loss = ?position.stop_loss(),
                        take_profit = ?position.take_profit(),
                        price,
                        "trigger fired"
                    );
                    self.close_units(data, account, index, size, price, false)?;
                }
                None => index += 1,
            }
        }
        Ok(())
    }

    /// Opens (or, in accumulate mode, grows) a position. Returns false when cash is short.
    fn open_position(
        &mut self,
        data: &Data,
        account: &mut Account,
        order: &OpenOrder,
        price: f64,
        market_order: bool,
    ) -> Result<bool> {
        let position_type = order.position_type();
        if self.position_mode == PositionMode::Accumulate && position_type == PositionType::Short {
            return Err(Error::ShortInAccumulateMode);
        }

        let size = order.size();
        let notional = size as f64 * price;
        let fee = self.fee(notional);
        if !account.has_at_least(notional + fee) {
            debug!(
                index = data.index(),
                phase = %data.phase(),
                required = notional + fee,
                available = account.current_cash(),
                "open skipped, insufficient cash"
            );
            return Ok(false);
        }

        account.credit(-(notional + fee));
        self.commission_paid += fee;

        let netted = match self.position_mode {
            PositionMode::Accumulate => self.positions.iter_mut().find(|p| p.position_type() == position_type),
            PositionMode::Distinct => None,
        };
        match netted {
            Some(position) => {
                position.accumulate(size, price, order.stop_loss_price(), order.take_profit_price());
            }
            None => {
                let id = PositionId(self.next_id);
                self.next_id += 1;
                let position = Position::new(id, position_type, price, size, data.timestamp(), data.index())
                    .with_triggers(order.stop_loss_price(), order.take_profit_price());
                self.positions.push(position);
            }
        }

        self.trades.push(Trade::Open {
            position_type,
            timestamp: data.timestamp(),
            index: data.index(),
            price,
            size,
            market_order,
        });
        debug!(
            index = data.index(),
            phase = %data.phase(),
            %position_type,
            price,
            size,
            fee,
            market_order,
            "open filled"
        );
        Ok(true)
    }

    /// Closes a targeted position, or the oldest positions of the order's direction.
    fn close_exposure(
        &mut self,
        data: &Data,
        account: &mut Account,
        order: &CloseOrder,
        price: f64,
        market_order: bool,
    ) -> Result<()> {
        if let Some(id) = order.target() {
            let index = self.position_index(id).ok_or(Error::PositionNotFound(id))?;
            let available = self.positions[index].size();
            if order.size() > available {
                return Err(Error::CloseSizeExceedsPosition {
                    id,
                    requested: order.size(),
                    available,
                });
            }
            self.close_units(data, account, index, order.size(), price, market_order)?;
            return Ok(());
        }

        let position_type = order.position_type();
        let available: u64 = self
            .positions
            .iter()
            .filter(|p| p.position_type() == position_type)
            .map(Position::size)
            .sum();
        if self.strict_close && available < order.size() {
            return Err(Error::InsufficientExposure {
                requested: order.size(),
                available,
            });
        }

        let mut remaining = order.size();
        let mut index = 0;
        while remaining > 0 && index < self.positions.len() {
            if self.positions[index].position_type() != position_type {
                index += 1;
                continue;
            }
            let units = remaining.min(self.positions[index].size());
            remaining -= units;
            if !self.close_units(data, account, index, units, price, market_order)? {
                index += 1;
            }
        }

        if remaining > 0 {
            debug!(
                index = data.index(),
                %position_type,
                requested = order.size(),
                dropped = remaining,
                "close exceeds open exposure, remainder dropped"
            );
        }
        Ok(())
    }

    /// Closes `size` units of the position at `index`. Returns true when the position is gone.
    fn close_units(
        &mut self,
        data: &Data,
        account: &mut Account,
        index: usize,
        size: u64,
        price: f64,
        market_order: bool,
    ) -> Result<bool> {
        let position = &self.positions[index];
        let reduced = position.reduce(size)?;
        let proceeds = position.proceeds(size, price);
        let trade = Trade::Close {
            position_type: position.position_type(),
            open_time: position.open_time(),
            open_index: position.open_index(),
            open_price: position.open_price(),
            close_time: data.timestamp(),
            close_index: data.index(),
            close_price: price,
            size,
            market_order,
        };
        let fee = self.fee(size as f64 * price);

        account.credit(proceeds - fee);
        self.commission_paid += fee;
        self.trades.push(trade);
        debug!(
            index = data.index(),
            phase = %data.phase(),
            price,
            size,
            fee,
            market_order,
            "close filled"
        );

        match reduced {
            Some(position) => {
                self.positions[index] = position;
                Ok(false)
            }
            None => {
                self.positions.remove(index);
                Ok(true)
            }
        }
    }
}
