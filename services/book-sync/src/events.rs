//! Events emitted by the engine to downstream consumers
//!
//! Consumers (renderers, recorders, analytics) see only these events; they
//! never touch engine state. Orders are carried as [`OrderView`] copies
//! taken at emission time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::ProductId;
use types::numeric::{Price, Size};
use types::order::Side;

use crate::order::OrderView;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum BookEvent {
    /// The book was seeded from a snapshot and is now live.
    #[serde(rename = "ready")]
    Ready,

    /// An order entered the visible head, or a transient order started.
    #[serde(rename = "add")]
    Added { order: OrderView },

    /// An order left the visible head, or a transient order ended.
    #[serde(rename = "remove")]
    Removed { order: OrderView },

    /// An order's remaining size changed in place.
    #[serde(rename = "change")]
    Changed {
        order: OrderView,
        /// Size taken off the order (negative if it grew).
        removed_size: Decimal,
    },

    /// Size moved between a taker and a maker during settlement.
    #[serde(rename = "transfer")]
    Transferred {
        to: OrderView,
        from: OrderView,
        size: Size,
        price: Price,
        /// Taker side.
        side: Side,
    },
}

impl BookEvent {
    /// Get the event kind as a string label for logging.
    pub fn kind_label(&self) -> &'static str {
        match self {
            BookEvent::Ready => "ready",
            BookEvent::Added { .. } => "add",
            BookEvent::Removed { .. } => "remove",
            BookEvent::Changed { .. } => "change",
            BookEvent::Transferred { .. } => "transfer",
        }
    }
}

/// A [`BookEvent`] tagged with the product it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEvent {
    pub product: ProductId,
    #[serde(flatten)]
    pub event: BookEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::OrderId;

    fn view() -> OrderView {
        OrderView {
            id: OrderId::new("a"),
            product: ProductId::new("BTC-USD"),
            side: Side::Sell,
            price: Some(Price::from_u64(10)),
            size: Size::new(Decimal::ONE),
            number: Some(0),
            is_market: false,
        }
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(BookEvent::Ready.kind_label(), "ready");
        assert_eq!(BookEvent::Added { order: view() }.kind_label(), "add");
        assert_eq!(BookEvent::Removed { order: view() }.kind_label(), "remove");
    }

    #[test]
    fn test_product_event_wire_shape() {
        let event = ProductEvent {
            product: ProductId::new("BTC-USD"),
            event: BookEvent::Changed {
                order: view(),
                removed_size: Decimal::new(5, 1),
            },
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["product"], "BTC-USD");
        assert_eq!(json["event"], "change");
        assert_eq!(json["order"]["id"], "a");
        assert_eq!(json["removed_size"], "0.5");
    }
}
