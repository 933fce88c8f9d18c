//! Order-Book Synchronization Service
//!
//! Maintains a bounded, consistent view of resting orders for one or more
//! products from:
//! - A level-3 snapshot fetched over REST (plus the last trade price)
//! - A sequence-numbered stream of order lifecycle messages
//!
//! Lost or reordered messages are detected by sequence number and repaired
//! by re-seeding. Only the best `limit` orders per side are visible, and
//! consumers see the book solely through add/remove/change/transfer events.
//!
//! # Architecture
//!
//! ```text
//!   WebSocket / recorded session
//!              │
//!        ┌─────▼─────┐
//!        │   Feed    │  ← subscribe, decode, reconnect / pace
//!        └─────┬─────┘
//!              │
//!        ┌─────▼─────┐
//!        │  Router   │  ← fan out by product_id
//!        └─┬───────┬─┘
//!          │       │
//!     ┌────▼──┐ ┌──▼────┐      REST snapshot + ticker
//!     │Worker │ │Worker │ ◀──── (SnapshotSource)
//!     │Engine │ │Engine │
//!     └────┬──┘ └──┬────┘
//!          │       │   last-price watch (cross conversion)
//!        ┌─▼───────▼─┐
//!        │ Broadcast │  ← ProductEvent to every subscriber
//!        └───────────┘
//! ```

pub mod bounded_index;
pub mod config;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod events;
pub mod feed;
pub mod ingestion;
pub mod messages;
pub mod metrics;
pub mod order;
pub mod replay;
pub mod router;
pub mod settlement;
pub mod snapshot;
pub mod source;
pub mod worker;

// Service version
pub const SERVICE_VERSION: &str = "0.1.0";
