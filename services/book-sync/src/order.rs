//! Order entity tracked by the synchronization engine
//!
//! An order lives in exactly one of the engine's maps: unopened (received,
//! possibly matching as a taker) or open (resting, possibly visible). Match
//! edges between a taker and its makers are stored as ids on both ends and
//! resolved through those maps, so neither side owns the other.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use types::ids::{OrderId, ProductId};
use types::numeric::{Price, Size};
use types::order::{OrderType, Side};

/// A trade against a maker that the taker has not settled yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMatch {
    pub maker: OrderId,
    pub size: Size,
    pub price: Price,
}

/// One resting or transient order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub product: ProductId,
    pub side: Side,
    /// Absent for market orders until their fills are averaged.
    pub price: Option<Price>,
    /// Remaining size. Absent for market orders submitted by funds.
    pub size: Option<Size>,
    pub is_market: bool,
    pub is_open: bool,
    pub is_done: bool,
    /// Insertion counter, assigned once when the order opens.
    pub number: Option<u64>,
    /// Matches where this order was the taker, awaiting settlement.
    pub makers: Vec<PendingMatch>,
    /// Takers that still owe this order a settlement.
    pub takers: Vec<OrderId>,
}

impl Order {
    /// Create an order from a "received" message.
    pub fn received(
        product: ProductId,
        id: OrderId,
        side: Side,
        price: Option<Price>,
        size: Option<Size>,
        order_type: OrderType,
    ) -> Self {
        Self {
            id,
            product,
            side,
            price,
            size,
            is_market: order_type == OrderType::Market,
            is_open: false,
            is_done: false,
            number: None,
            makers: Vec::new(),
            takers: Vec::new(),
        }
    }

    /// Remaining size, zero when unknown.
    pub fn remaining(&self) -> Size {
        self.size.unwrap_or(Size::ZERO)
    }

    /// Reduce the remaining size, clamping at zero.
    pub fn reduce(&mut self, by: Size) {
        self.size = Some(self.remaining().saturating_sub(by));
    }

    /// Sort key within its side's index. Requires a price and an insertion counter.
    pub fn key(&self) -> Option<OrderKey> {
        Some(OrderKey {
            side: self.side,
            price: self.price?,
            number: self.number?,
            id: self.id.clone(),
        })
    }

    pub fn view(&self) -> OrderView {
        OrderView {
            id: self.id.clone(),
            product: self.product.clone(),
            side: self.side,
            price: self.price,
            size: self.remaining(),
            number: self.number,
            is_market: self.is_market,
        }
    }
}

/// Immutable copy of an order carried by engine events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderView {
    pub id: OrderId,
    pub product: ProductId,
    pub side: Side,
    pub price: Option<Price>,
    pub size: Size,
    pub number: Option<u64>,
    pub is_market: bool,
}

/// Price-time priority key.
///
/// Asks sort by ascending price, bids by descending price; equal prices
/// fall back to the insertion counter so earlier orders rank first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderKey {
    pub side: Side,
    pub price: Price,
    pub number: u64,
    pub id: OrderId,
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_price = match self.side {
            Side::Buy => other.price.cmp(&self.price),
            Side::Sell => self.price.cmp(&other.price),
        };
        self.side
            .cmp(&other.side)
            .then(by_price)
            .then_with(|| self.number.cmp(&other.number))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(side: Side, price: u64, number: u64) -> OrderKey {
        OrderKey {
            side,
            price: Price::from_u64(price),
            number,
            id: OrderId::new(format!("o{number}")),
        }
    }

    #[test]
    fn test_ask_keys_ascend_by_price() {
        assert!(key(Side::Sell, 9, 5) < key(Side::Sell, 10, 0));
    }

    #[test]
    fn test_bid_keys_descend_by_price() {
        assert!(key(Side::Buy, 11, 5) < key(Side::Buy, 10, 0));
    }

    #[test]
    fn test_equal_price_ranks_by_insertion() {
        assert!(key(Side::Sell, 10, 1) < key(Side::Sell, 10, 2));
        assert!(key(Side::Buy, 10, 1) < key(Side::Buy, 10, 2));
    }

    #[test]
    fn test_key_requires_price_and_number() {
        let mut order = Order::received(
            ProductId::new("BTC-USD"),
            OrderId::new("a"),
            Side::Buy,
            None,
            None,
            OrderType::Market,
        );
        assert!(order.is_market);
        assert!(order.key().is_none());

        order.price = Some(Price::from_u64(10));
        assert!(order.key().is_none());
        order.number = Some(3);
        assert_eq!(order.key().map(|k| k.number), Some(3));
    }

    #[test]
    fn test_reduce_clamps_at_zero() {
        let mut order = Order::received(
            ProductId::new("BTC-USD"),
            OrderId::new("a"),
            Side::Sell,
            Some(Price::from_u64(10)),
            Some(Size::new(rust_decimal::Decimal::ONE)),
            OrderType::Limit,
        );
        order.reduce(Size::new(rust_decimal::Decimal::TWO));
        assert_eq!(order.remaining(), Size::ZERO);
        assert_eq!(order.view().size, Size::ZERO);
    }
}
