//! Wire formats exchanged with the venue
//!
//! Streaming messages arrive as JSON objects tagged by `type`. Only the five
//! order-lifecycle kinds are modeled; anything else on the socket
//! (subscription acks, heartbeats, tickers) fails to decode as a
//! [`FeedMessage`] and is skipped by the feed adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use types::ids::{OrderId, ProductId};
use types::numeric::{Price, Size};
use types::order::{OrderType, Side};

/// One sequence-numbered message from the push transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage {
    pub product_id: ProductId,
    /// Per-product monotonic sequence number.
    pub sequence: u64,
    /// Venue timestamp; drives pacing when replaying a recorded session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub body: MessageBody,
}

/// Message payload, one variant per order-lifecycle step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageBody {
    /// An order reached the matching engine.
    Received {
        order_id: OrderId,
        side: Side,
        #[serde(default)]
        price: Option<Price>,
        #[serde(default)]
        size: Option<Size>,
        #[serde(default)]
        order_type: OrderType,
    },

    /// The unfilled remainder of an order is now resting on the book.
    Open {
        order_id: OrderId,
        side: Side,
        #[serde(default)]
        price: Option<Price>,
        #[serde(default)]
        remaining_size: Option<Size>,
    },

    /// A taker traded against a resting maker.
    Match {
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        side: Side,
        size: Size,
        price: Price,
    },

    /// A resting order was resized in place.
    Change {
        order_id: OrderId,
        side: Side,
        new_size: Size,
        #[serde(default)]
        price: Option<Price>,
    },

    /// The order left the book (filled or canceled).
    Done {
        order_id: OrderId,
        side: Side,
        #[serde(default)]
        price: Option<Price>,
        #[serde(default)]
        remaining_size: Option<Size>,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl FeedMessage {
    /// Get the message type as a string label for logging.
    pub fn kind_label(&self) -> &'static str {
        match &self.body {
            MessageBody::Received { .. } => "received",
            MessageBody::Open { .. } => "open",
            MessageBody::Match { .. } => "match",
            MessageBody::Change { .. } => "change",
            MessageBody::Done { .. } => "done",
        }
    }
}

/// One `[price, size, order_id]` row of a level-3 book snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry(pub Price, pub Size, pub OrderId);

/// Full point-in-time book, as returned by the snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    /// Sequence number of the last message reflected in this snapshot.
    pub sequence: u64,
    /// Bids, best first.
    pub bids: Vec<SnapshotEntry>,
    /// Asks, best first.
    pub asks: Vec<SnapshotEntry>,
}

/// Last-trade ticker. Other ticker fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticker {
    pub price: Price,
}

/// Requests sent to the venue over the push connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Subscribe { product_ids: Vec<ProductId> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_decode_received_limit() {
        let raw = r#"{
            "type": "received",
            "time": "2014-11-07T08:19:27.028459Z",
            "product_id": "BTC-USD",
            "sequence": 10,
            "order_id": "d50ec984-77a8-460a-b958-66f114b0de9b",
            "size": "1.34",
            "price": "502.1",
            "side": "buy",
            "order_type": "limit"
        }"#;
        let msg: FeedMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.sequence, 10);
        assert_eq!(msg.kind_label(), "received");
        assert!(msg.time.is_some());
        match msg.body {
            MessageBody::Received { price, size, order_type, side, .. } => {
                assert_eq!(price, Some(Price::from_str("502.1").unwrap()));
                assert_eq!(size, Some(Size::from_str("1.34").unwrap()));
                assert_eq!(order_type, OrderType::Limit);
                assert_eq!(side, Side::Buy);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_decode_received_market_without_price() {
        let raw = r#"{"type":"received","product_id":"BTC-USD","sequence":12,
            "order_id":"m1","funds":"3000.23","side":"buy","order_type":"market"}"#;
        let msg: FeedMessage = serde_json::from_str(raw).unwrap();
        match msg.body {
            MessageBody::Received { price, size, order_type, .. } => {
                assert!(price.is_none());
                assert!(size.is_none());
                assert_eq!(order_type, OrderType::Market);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_decode_match_and_done() {
        let raw = r#"{"type":"match","trade_id":10,"sequence":50,"product_id":"BTC-USD",
            "maker_order_id":"ac928c66","taker_order_id":"132fb6ae",
            "size":"5.23512","price":"400.23","side":"sell"}"#;
        let msg: FeedMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.kind_label(), "match");

        let raw = r#"{"type":"done","product_id":"BTC-USD","sequence":51,"price":"200.2",
            "order_id":"d50ec984","reason":"filled","side":"sell","remaining_size":"0"}"#;
        let msg: FeedMessage = serde_json::from_str(raw).unwrap();
        match msg.body {
            MessageBody::Done { remaining_size, reason, .. } => {
                assert_eq!(remaining_size, Some(Size::ZERO));
                assert_eq!(reason.as_deref(), Some("filled"));
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_non_book_messages_do_not_decode() {
        let raw = r#"{"type":"subscriptions","channels":[{"name":"full","product_ids":["BTC-USD"]}]}"#;
        assert!(serde_json::from_str::<FeedMessage>(raw).is_err());

        let raw = r#"{"type":"heartbeat","product_id":"BTC-USD","sequence":90}"#;
        assert!(serde_json::from_str::<FeedMessage>(raw).is_err());
    }

    #[test]
    fn test_decode_snapshot_and_ticker() {
        let raw = r#"{"sequence": 3, "bids": [["295.96", "0.05", "3b0f1225"]],
            "asks": [["295.97", "5.72", "da863862"], ["295.98", "1.0", "aa11"]]}"#;
        let book: BookSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(book.sequence, 3);
        assert_eq!(book.bids[0].2, OrderId::new("3b0f1225"));
        assert_eq!(book.asks.len(), 2);

        let ticker: Ticker = serde_json::from_str(r#"{"trade_id": 4729088, "price": "333.99", "size": "0.193"}"#).unwrap();
        assert_eq!(ticker.price, Price::from_str("333.99").unwrap());
    }

    #[test]
    fn test_subscribe_request_format() {
        let request = ControlMessage::Subscribe {
            product_ids: vec![ProductId::new("BTC-USD"), ProductId::new("ETH-USD")],
        };
        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"type":"subscribe","product_ids":["BTC-USD","ETH-USD"]}"#
        );
    }
}
