//! Checksummed view of the visible book
//!
//! Captures what a consumer should currently be displaying: the visible
//! head of each side, best first, plus the sequence and last price it was
//! taken at. The SHA-256 checksum lets two engines fed the same input be
//! compared cheaply, e.g. to confirm a replay is deterministic.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use types::ids::ProductId;
use types::numeric::Price;
use types::order::Side;

use crate::engine::SyncEngine;
use crate::order::OrderView;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleSnapshot {
    pub product: ProductId,
    /// Last applied sequence; `None` while unseeded.
    pub sequence: Option<u64>,
    pub last_price: Price,
    /// Visible bids, highest price first.
    pub bids: Vec<OrderView>,
    /// Visible asks, lowest price first.
    pub asks: Vec<OrderView>,
    /// SHA-256 over the fields above, hex encoded.
    pub checksum: String,
}

impl VisibleSnapshot {
    pub fn capture(engine: &SyncEngine) -> Self {
        let bids = engine.visible(Side::Buy);
        let asks = engine.visible(Side::Sell);
        let sequence = engine.last_sequence();
        let last_price = engine.last_price();
        let checksum = compute_checksum(&bids, &asks, sequence, last_price);
        Self {
            product: engine.product().clone(),
            sequence,
            last_price,
            bids,
            asks,
            checksum,
        }
    }

    /// Best bid and best ask, if present.
    pub fn top_of_book(&self) -> (Option<&OrderView>, Option<&OrderView>) {
        (self.bids.first(), self.asks.first())
    }
}

fn compute_checksum(bids: &[OrderView], asks: &[OrderView], sequence: Option<u64>, last_price: Price) -> String {
    let mut hasher = Sha256::new();

    for side in [bids, asks] {
        for order in side {
            hasher.update(order.id.as_str().as_bytes());
            hasher.update(b"@");
            if let Some(price) = order.price {
                hasher.update(price.to_string().as_bytes());
            }
            hasher.update(b":");
            hasher.update(order.size.as_decimal().normalize().to_string().as_bytes());
            hasher.update(b"|");
        }
        hasher.update(b"---");
    }

    hasher.update(sequence.unwrap_or(u64::MAX).to_le_bytes());
    hasher.update(last_price.as_decimal().normalize().to_string().as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Verify that a snapshot's checksum matches its content.
pub fn verify_snapshot_integrity(snapshot: &VisibleSnapshot) -> bool {
    let expected = compute_checksum(&snapshot.bids, &snapshot.asks, snapshot.sequence, snapshot.last_price);
    snapshot.checksum == expected
}
