//! Match settlement
//!
//! Matches are recorded when they arrive but settled only when the taker is
//! next processed (on open, or on done for orders that never rest). Both
//! parties are decremented by the matched size, so the total size leaving
//! a taker always equals the total moved to or from its makers.

use rust_decimal::Decimal;
use tracing::debug;
use types::ids::OrderId;
use types::numeric::{Price, Size};
use types::order::Side;

use crate::engine::SyncEngine;
use crate::events::BookEvent;

impl SyncEngine {
    /// Settle every match queued on `taker_id`.
    ///
    /// Emits one `transfer` per match, then releases the makers: a maker
    /// that is done and owes no further settlement leaves the book here.
    pub(crate) fn settle_matches(&mut self, taker_id: &OrderId) {
        let Some(taker) = self.order_mut(taker_id) else {
            return;
        };
        let matches = std::mem::take(&mut taker.makers);
        let taker_side = taker.side;
        if matches.is_empty() {
            return;
        }

        for settled in &matches {
            let (to, from) = match taker_side {
                Side::Sell => (&settled.maker, taker_id),
                Side::Buy => (taker_id, &settled.maker),
            };
            self.flush_pending_insert(to);
            self.flush_pending_insert(from);
            if let (Some(to_view), Some(from_view)) = (self.view_of(to), self.view_of(from)) {
                self.outbox.push(BookEvent::Transferred {
                    to: to_view,
                    from: from_view,
                    size: settled.size,
                    price: settled.price,
                    side: taker_side,
                });
            }
            for party in [to, from] {
                if let Some(order) = self.order_mut(party) {
                    order.reduce(settled.size);
                }
            }
        }

        for settled in &matches {
            let Some(maker) = self.order_mut(&settled.maker) else {
                continue;
            };
            if let Some(pos) = maker.takers.iter().position(|id| id == taker_id) {
                maker.takers.remove(pos);
            }
            if !maker.is_open {
                let order = maker.view();
                self.outbox.push(BookEvent::Removed { order });
            } else if maker.takers.is_empty() && maker.is_done {
                self.retire(&settled.maker);
            }
        }
    }

    /// Give an order that traded without ever resting a short add,
    /// transfer, remove lifecycle.
    ///
    /// Market orders carry no price (and, when sized by funds, no size), so
    /// they take the size-weighted average fill price and the total filled
    /// size. Orders with no fills are dropped silently.
    pub(crate) fn settle_transient(&mut self, id: &OrderId) {
        let Some(order) = self.unopened.get_mut(id) else {
            return;
        };
        if order.makers.is_empty() {
            debug!(product = %order.product, order_id = %id, "Transient order without fills discarded");
            return;
        }

        let mut filled = Size::ZERO;
        let mut notional = Decimal::ZERO;
        for fill in &order.makers {
            filled += fill.size;
            notional += fill.size.notional(fill.price);
        }
        if order.price.is_none() {
            order.price = notional.checked_div(filled.as_decimal()).map(Price::new);
        }
        if order.size.is_none() {
            order.size = Some(filled);
        }

        let order = order.view();
        self.outbox.push(BookEvent::Added { order });
        self.settle_matches(id);
        if let Some(order) = self.view_of(id) {
            self.outbox.push(BookEvent::Removed { order });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tokio::time::Instant;
    use types::ids::ProductId;
    use types::order::OrderType;

    use crate::config::SyncConfig;
    use crate::engine::SyncEngine;
    use crate::events::BookEvent;
    use crate::messages::{BookSnapshot, FeedMessage, MessageBody, SnapshotEntry, Ticker};

    use super::*;

    fn size(s: &str) -> Size {
        Size::from_str(s).unwrap()
    }

    struct Script {
        engine: SyncEngine,
        sequence: u64,
        now: Instant,
    }

    impl Script {
        /// Live engine with one resting ask `m1` (10 @ 2) and bid `b1` (9 @ 1).
        fn new() -> Self {
            let now = Instant::now();
            let mut engine = SyncEngine::new(ProductId::new("BTC-USD"), &SyncConfig::default());
            engine.begin_seed();
            let book = BookSnapshot {
                sequence: 100,
                bids: vec![SnapshotEntry(Price::from_u64(9), size("1"), OrderId::new("b1"))],
                asks: vec![SnapshotEntry(Price::from_u64(10), size("2"), OrderId::new("m1"))],
            };
            engine.apply_seed(Ticker { price: Price::from_u64(10) }, book, now);
            engine.drain_events();
            Self {
                engine,
                sequence: 100,
                now,
            }
        }

        fn send(&mut self, body: MessageBody) {
            self.sequence += 1;
            let message = FeedMessage {
                product_id: ProductId::new("BTC-USD"),
                sequence: self.sequence,
                time: None,
                body,
            };
            self.engine.handle_message(message, self.now);
        }

        fn received(&mut self, id: &str, side: Side, price: Option<u64>, amount: Option<&str>, order_type: OrderType) {
            self.send(MessageBody::Received {
                order_id: OrderId::new(id),
                side,
                price: price.map(Price::from_u64),
                size: amount.map(size),
                order_type,
            });
        }

        fn matched(&mut self, maker: &str, taker: &str, amount: &str, price: u64) {
            self.send(MessageBody::Match {
                maker_order_id: OrderId::new(maker),
                taker_order_id: OrderId::new(taker),
                side: Side::Sell,
                size: size(amount),
                price: Price::from_u64(price),
            });
        }

        fn open(&mut self, id: &str, side: Side) {
            self.send(MessageBody::Open {
                order_id: OrderId::new(id),
                side,
                price: None,
                remaining_size: None,
            });
        }

        fn done(&mut self, id: &str, side: Side) {
            self.send(MessageBody::Done {
                order_id: OrderId::new(id),
                side,
                price: None,
                remaining_size: None,
                reason: Some("filled".to_string()),
            });
        }
    }

    #[test]
    fn test_limit_taker_settles_on_open() {
        let mut script = Script::new();
        script.received("t1", Side::Buy, Some(10), Some("3"), OrderType::Limit);
        script.matched("m1", "t1", "2", 10);
        script.done("m1", Side::Sell);
        // m1 still owes t1 a settlement, so it stays on the book for now.
        assert!(script.engine.order(&OrderId::new("m1")).is_some());
        assert!(script.engine.drain_events().is_empty());

        script.open("t1", Side::Buy);
        let events = script.engine.drain_events();
        let labels: Vec<_> = events.iter().map(BookEvent::kind_label).collect();
        assert_eq!(labels, vec!["add", "transfer", "remove"]);

        match &events[1] {
            BookEvent::Transferred { to, from, size: moved, side, .. } => {
                assert_eq!(to.id, OrderId::new("t1"));
                assert_eq!(from.id, OrderId::new("m1"));
                assert_eq!(*moved, size("2"));
                assert_eq!(*side, Side::Buy);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(script.engine.order(&OrderId::new("t1")).map(|o| o.remaining()), Some(size("1")));
        assert!(script.engine.order(&OrderId::new("m1")).is_none());
    }

    #[test]
    fn test_sell_taker_transfers_to_maker() {
        let mut script = Script::new();
        script.received("t2", Side::Sell, Some(9), Some("0.4"), OrderType::Limit);
        script.matched("b1", "t2", "0.4", 9);
        script.done("t2", Side::Sell);

        let events = script.engine.drain_events();
        let labels: Vec<_> = events.iter().map(BookEvent::kind_label).collect();
        assert_eq!(labels, vec!["add", "transfer", "remove"]);
        match &events[1] {
            BookEvent::Transferred { to, from, .. } => {
                assert_eq!(to.id, OrderId::new("b1"));
                assert_eq!(from.id, OrderId::new("t2"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(script.engine.order(&OrderId::new("b1")).map(|o| o.remaining()), Some(size("0.6")));
        assert!(script.engine.order(&OrderId::new("t2")).is_none());
    }

    #[test]
    fn test_market_order_takes_average_fill_price() {
        let mut script = Script::new();
        script.received("t3", Side::Buy, None, None, OrderType::Market);
        script.matched("m1", "t3", "1", 10);
        script.matched("m1", "t3", "0.5", 13);
        script.done("t3", Side::Buy);

        let events = script.engine.drain_events();
        let labels: Vec<_> = events.iter().map(BookEvent::kind_label).collect();
        assert_eq!(labels, vec!["add", "transfer", "transfer", "remove"]);
        match &events[0] {
            BookEvent::Added { order } => {
                assert!(order.is_market);
                assert_eq!(order.price, Some(Price::from_u64(11)));
                assert_eq!(order.size, size("1.5"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(script.engine.order(&OrderId::new("m1")).map(|o| o.remaining()), Some(size("0.5")));
    }

    #[test]
    fn test_transient_without_fills_is_silent() {
        let mut script = Script::new();
        script.received("t4", Side::Buy, None, None, OrderType::Market);
        script.done("t4", Side::Buy);
        assert!(script.engine.drain_events().is_empty());
        assert!(script.engine.order(&OrderId::new("t4")).is_none());
    }

    #[test]
    fn test_transfer_flushes_pending_maker() {
        let mut script = Script::new();
        script.received("m2", Side::Sell, Some(11), Some("1"), OrderType::Limit);
        script.open("m2", Side::Sell);
        assert!(script.engine.is_pending_insert(&OrderId::new("m2")));

        script.received("t5", Side::Buy, Some(11), Some("1"), OrderType::Limit);
        script.matched("m2", "t5", "1", 11);
        script.done("t5", Side::Buy);

        let events = script.engine.drain_events();
        let labels: Vec<_> = events.iter().map(BookEvent::kind_label).collect();
        // m2 becomes visible before the transfer that touches it.
        assert_eq!(labels, vec!["add", "add", "transfer", "remove"]);
        assert!(!script.engine.is_pending_insert(&OrderId::new("m2")));
    }
}
