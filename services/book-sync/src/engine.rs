//! Per-product synchronization engine
//!
//! Rebuilds one product's order book from a level-3 snapshot plus the
//! sequence-numbered message stream, keeping only the best `limit` orders
//! per side visible. All state lives here and is mutated from one task;
//! time enters only through the `now` arguments, so the engine itself is
//! fully deterministic and can be driven directly by tests.
//!
//! # Lifecycle
//!
//! ```text
//!  Unseeded ──begin_seed──▶ Seeding ──apply_seed──▶ Live
//!     ▲                        │                     │
//!     └──────seed_failed───────┘                     │
//!                  ▲                                 │
//!                  └────begin_seed (on gap)──────────┘
//! ```
//!
//! While unseeded (and while seeding) messages are buffered. Once live, a
//! message is applied only if its sequence is the next one; a gap is
//! reported back as [`ApplyOutcome::ResyncRequired`] and the caller starts
//! a new seed.

use std::collections::BTreeMap;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use types::ids::{OrderId, ProductId};
use types::numeric::{Price, Size};
use types::order::{OrderType, Side};

use crate::bounded_index::{BoundedIndex, IndexChange};
use crate::config::SyncConfig;
use crate::conversion::{self, CrossConversion, SideBoundary};
use crate::events::BookEvent;
use crate::ingestion::{PreSeedQueue, SequenceCheck, SequenceGate};
use crate::messages::{BookSnapshot, FeedMessage, MessageBody, SnapshotEntry, Ticker};
use crate::order::{Order, OrderKey, OrderView, PendingMatch};
use crate::snapshot::VisibleSnapshot;

/// Result of offering one message (or a snapshot) to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Sequence was the next expected one and the message was applied.
    Applied,
    /// Not seeded yet; held for replay after the snapshot lands.
    Buffered,
    /// Duplicate or already covered by the snapshot; dropped.
    Stale,
    /// Messages were lost; the book must be re-seeded.
    ResyncRequired,
    /// Message belongs to another product.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unseeded,
    Seeding,
    Live,
}

/// How an opening order reaches its side's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Insertion {
    /// Snapshot replay: visible right away.
    Immediate,
    /// Live open: visible after the smoothing delay.
    Delayed,
}

pub struct SyncEngine {
    pub(crate) product: ProductId,
    canonical_asset: String,
    insert_delay: Duration,
    sequence: SequenceGate,
    /// Single-flight guard for snapshot fetches.
    fetching: bool,
    queue: PreSeedQueue,
    pub(crate) unopened: BTreeMap<OrderId, Order>,
    pub(crate) open: BTreeMap<OrderId, Order>,
    bids: BoundedIndex<OrderKey>,
    asks: BoundedIndex<OrderKey>,
    bid_boundary: SideBoundary,
    ask_boundary: SideBoundary,
    /// Orders waiting out the smoothing delay. Removing an entry cancels it.
    pending_inserts: BTreeMap<OrderId, Instant>,
    next_number: u64,
    last_price: Price,
    price_tx: watch::Sender<Price>,
    cross: Option<CrossConversion>,
    pub(crate) outbox: Vec<BookEvent>,
}

impl SyncEngine {
    pub fn new(product: ProductId, config: &SyncConfig) -> Self {
        let (price_tx, _) = watch::channel(Price::ONE);
        Self {
            product,
            canonical_asset: config.canonical_asset.clone(),
            insert_delay: config.insert_delay(),
            sequence: SequenceGate::new(),
            fetching: false,
            queue: PreSeedQueue::new(config.preseed_capacity),
            unopened: BTreeMap::new(),
            open: BTreeMap::new(),
            bids: BoundedIndex::new(config.limit),
            asks: BoundedIndex::new(config.limit),
            bid_boundary: SideBoundary::default(),
            ask_boundary: SideBoundary::default(),
            pending_inserts: BTreeMap::new(),
            next_number: 0,
            last_price: Price::ONE,
            price_tx,
            cross: None,
            outbox: Vec::new(),
        }
    }

    pub fn product(&self) -> &ProductId {
        &self.product
    }

    pub fn state(&self) -> EngineState {
        if self.fetching {
            EngineState::Seeding
        } else if self.sequence.is_seeded() {
            EngineState::Live
        } else {
            EngineState::Unseeded
        }
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.sequence.last()
    }

    pub fn last_price(&self) -> Price {
        self.last_price
    }

    /// Receiver that always holds this product's last traded price.
    pub fn price_feed(&self) -> watch::Receiver<Price> {
        self.price_tx.subscribe()
    }

    /// Use `reference`'s last price to normalize this product's sizes.
    pub fn set_cross_conversion(&mut self, reference: ProductId, price: watch::Receiver<Price>) {
        let conversion = CrossConversion::new(&self.product, reference, price);
        debug!(
            product = %self.product,
            reference = %conversion.reference,
            relation = ?conversion.relation,
            "Cross conversion registered"
        );
        self.cross = Some(conversion);
    }

    pub fn cross_conversion(&self) -> Option<&CrossConversion> {
        self.cross.as_ref()
    }

    // === Seeding ===

    /// Start a resync. Returns false if a snapshot fetch is already in flight.
    ///
    /// Clears the book (emitting `remove` for every visible order) and
    /// forgets the sequence, so messages are buffered until [`apply_seed`].
    /// Messages already buffered are kept for replay.
    ///
    /// [`apply_seed`]: SyncEngine::apply_seed
    pub fn begin_seed(&mut self) -> bool {
        if self.fetching {
            return false;
        }
        self.clear();
        self.fetching = true;
        true
    }

    /// The snapshot or ticker fetch failed. Buffered messages are kept.
    pub fn seed_failed(&mut self) {
        self.fetching = false;
    }

    /// Rebuild the book from a snapshot, then replay messages buffered
    /// while it was being fetched.
    ///
    /// Emits `ready` unless replaying the buffer uncovered a gap. In that
    /// case the book is cleared again, the messages after the gap go back
    /// into the buffer and [`ApplyOutcome::ResyncRequired`] is returned.
    pub fn apply_seed(&mut self, ticker: Ticker, book: BookSnapshot, now: Instant) -> ApplyOutcome {
        self.fetching = false;
        let queued = self.queue.drain();
        self.clear();
        self.set_last_price(ticker.price);
        self.sequence.seed(book.sequence);

        let (bid_count, ask_count) = (book.bids.len(), book.asks.len());
        for (side, entries) in [(Side::Buy, book.bids), (Side::Sell, book.asks)] {
            for SnapshotEntry(price, size, id) in entries {
                self.on_received(&id, side, Some(price), Some(size), OrderType::Limit);
                self.on_open(&id, None, now, Insertion::Immediate);
            }
        }
        info!(
            product = %self.product,
            sequence = book.sequence,
            bids = bid_count,
            asks = ask_count,
            queued = queued.len(),
            "Seeded book from snapshot"
        );

        let mut queued = queued.into_iter();
        while let Some(message) = queued.next() {
            if self.handle_message(message, now) == ApplyOutcome::ResyncRequired {
                // The snapshot lags the feed. Keep what came after the gap
                // for the next snapshot.
                self.clear();
                for message in queued {
                    self.queue.push(message);
                }
                return ApplyOutcome::ResyncRequired;
            }
        }
        self.outbox.push(BookEvent::Ready);
        ApplyOutcome::Applied
    }

    // === Message application ===

    /// Offer one stream message to the engine.
    pub fn handle_message(&mut self, message: FeedMessage, now: Instant) -> ApplyOutcome {
        if message.product_id != self.product {
            return ApplyOutcome::Ignored;
        }
        let Some(check) = self.sequence.check(message.sequence) else {
            self.queue.push(message);
            return ApplyOutcome::Buffered;
        };
        match check {
            SequenceCheck::Stale { last } => {
                debug!(
                    product = %self.product,
                    sequence = message.sequence,
                    last,
                    "Dropping stale message"
                );
                ApplyOutcome::Stale
            }
            SequenceCheck::Gap { expected, actual } => {
                warn!(
                    product = %self.product,
                    expected,
                    actual,
                    "Sequence gap detected, resync required"
                );
                ApplyOutcome::ResyncRequired
            }
            SequenceCheck::Next => {
                let sequence = message.sequence;
                self.apply(message.body, now);
                self.sequence.advance(sequence);
                ApplyOutcome::Applied
            }
        }
    }

    fn apply(&mut self, body: MessageBody, now: Instant) {
        match body {
            MessageBody::Received {
                order_id,
                side,
                price,
                size,
                order_type,
            } => self.on_received(&order_id, side, price, size, order_type),
            MessageBody::Open {
                order_id,
                remaining_size,
                ..
            } => self.on_open(&order_id, remaining_size, now, Insertion::Delayed),
            MessageBody::Match {
                maker_order_id,
                taker_order_id,
                size,
                price,
                ..
            } => self.on_match(&maker_order_id, &taker_order_id, size, price),
            MessageBody::Change {
                order_id, new_size, ..
            } => self.on_change(&order_id, new_size),
            MessageBody::Done { order_id, .. } => self.on_done(&order_id),
        }
    }

    fn on_received(
        &mut self,
        id: &OrderId,
        side: Side,
        price: Option<Price>,
        size: Option<Size>,
        order_type: OrderType,
    ) {
        let order = Order::received(self.product.clone(), id.clone(), side, price, size, order_type);
        self.unopened.insert(id.clone(), order);
    }

    fn on_open(&mut self, id: &OrderId, remaining: Option<Size>, now: Instant, insertion: Insertion) {
        let Some(mut order) = self.unopened.remove(id) else {
            debug!(product = %self.product, order_id = %id, "Open for unknown order");
            return;
        };
        order.is_open = true;
        order.number = Some(self.next_number);
        self.next_number += 1;
        self.open.insert(id.clone(), order);

        match insertion {
            Insertion::Immediate => self.insert_into_index(id),
            Insertion::Delayed => {
                self.pending_inserts.insert(id.clone(), now + self.insert_delay);
            }
        }
        self.settle_matches(id);

        let Some(remaining) = remaining else {
            return;
        };
        if let Some(order) = self.open.get_mut(id) {
            let before = order.remaining();
            if before != remaining {
                order.size = Some(remaining);
                self.changed(id, before.delta(remaining));
            }
        }
    }

    fn on_match(&mut self, maker_id: &OrderId, taker_id: &OrderId, size: Size, price: Price) {
        let maker_live = self.open.get(maker_id).is_some_and(|maker| !maker.is_done);
        if !maker_live || !self.unopened.contains_key(taker_id) {
            debug!(
                product = %self.product,
                maker = %maker_id,
                taker = %taker_id,
                "Dropping match with unknown party"
            );
            return;
        }
        if let Some(taker) = self.unopened.get_mut(taker_id) {
            taker.makers.push(PendingMatch {
                maker: maker_id.clone(),
                size,
                price,
            });
        }
        if let Some(maker) = self.open.get_mut(maker_id) {
            maker.takers.push(taker_id.clone());
        }
        self.set_last_price(price);
    }

    fn on_change(&mut self, id: &OrderId, new_size: Size) {
        let Some(order) = self.open.get_mut(id) else {
            debug!(product = %self.product, order_id = %id, "Change for unknown order");
            return;
        };
        // Done makers only linger until their takers settle.
        if order.is_done {
            debug!(product = %self.product, order_id = %id, "Change for finished order");
            return;
        }
        let before = order.remaining();
        order.size = Some(new_size);
        if before != new_size {
            self.changed(id, before.delta(new_size));
        }
    }

    fn on_done(&mut self, id: &OrderId) {
        if let Some(order) = self.open.get_mut(id) {
            order.is_done = true;
            self.settle_matches(id);
            let awaiting_takers = self.open.get(id).is_some_and(|order| !order.takers.is_empty());
            if !awaiting_takers {
                self.retire(id);
            }
        } else if let Some(order) = self.unopened.get_mut(id) {
            order.is_done = true;
            self.settle_transient(id);
            self.unopened.remove(id);
        } else {
            debug!(product = %self.product, order_id = %id, "Done for unknown order");
        }
    }

    // === Delayed insertion ===

    /// Earliest pending insertion, if any.
    pub fn next_insert_due(&self) -> Option<Instant> {
        self.pending_inserts.values().min().copied()
    }

    /// Insert every order whose smoothing delay has elapsed, oldest first.
    /// Returns how many were inserted.
    pub fn fire_due_inserts(&mut self, now: Instant) -> usize {
        let mut due: Vec<(Instant, u64, OrderId)> = self
            .pending_inserts
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| {
                let number = self.open.get(id).and_then(|order| order.number).unwrap_or(u64::MAX);
                (*at, number, id.clone())
            })
            .collect();
        due.sort();

        let mut fired = 0;
        for (_, _, id) in due {
            if self.pending_inserts.remove(&id).is_some() {
                self.insert_into_index(&id);
                fired += 1;
            }
        }
        fired
    }

    pub fn is_pending_insert(&self, id: &OrderId) -> bool {
        self.pending_inserts.contains_key(id)
    }

    /// Insert now if the order is still waiting out its delay.
    pub(crate) fn flush_pending_insert(&mut self, id: &OrderId) {
        if self.pending_inserts.remove(id).is_some() {
            self.insert_into_index(id);
        }
    }

    // === Index maintenance ===

    fn insert_into_index(&mut self, id: &OrderId) {
        let Some(key) = self.open.get(id).and_then(Order::key) else {
            debug!(product = %self.product, order_id = %id, "Order has no sort key, not indexed");
            return;
        };
        let side = key.side;
        let change = self.index_mut(side).insert(key);
        self.apply_index_change(side, change);
    }

    /// Take an order out of its index, or cancel its pending insertion.
    /// A cancelled insertion emits nothing.
    pub(crate) fn remove_from_index(&mut self, id: &OrderId) {
        if self.pending_inserts.remove(id).is_some() {
            return;
        }
        let Some(key) = self.open.get(id).and_then(Order::key) else {
            return;
        };
        let side = key.side;
        let change = self.index_mut(side).remove(&key);
        self.apply_index_change(side, change);
    }

    /// Remove a finished order from the index and the open map.
    pub(crate) fn retire(&mut self, id: &OrderId) {
        self.remove_from_index(id);
        self.open.remove(id);
    }

    fn apply_index_change(&mut self, side: Side, change: IndexChange<OrderKey>) {
        if change.is_noop() {
            return;
        }
        let index = self.index(side);
        let boundary = SideBoundary {
            min: index.head_min().cloned(),
            max: index.head_max().cloned(),
        };
        *self.boundary_mut(side) = boundary;

        if let Some(order) = change.evicted.and_then(|key| self.view_of(&key.id)) {
            self.outbox.push(BookEvent::Removed { order });
        }
        if let Some(order) = change.entered.and_then(|key| self.view_of(&key.id)) {
            self.outbox.push(BookEvent::Added { order });
        }
    }

    fn index(&self, side: Side) -> &BoundedIndex<OrderKey> {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn index_mut(&mut self, side: Side) -> &mut BoundedIndex<OrderKey> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    pub fn boundary(&self, side: Side) -> &SideBoundary {
        match side {
            Side::Buy => &self.bid_boundary,
            Side::Sell => &self.ask_boundary,
        }
    }

    fn boundary_mut(&mut self, side: Side) -> &mut SideBoundary {
        match side {
            Side::Buy => &mut self.bid_boundary,
            Side::Sell => &mut self.ask_boundary,
        }
    }

    // === Queries ===

    /// Visible orders on one side, best first.
    pub fn visible(&self, side: Side) -> Vec<OrderView> {
        self.index(side)
            .visible()
            .filter_map(|key| self.open.get(&key.id))
            .map(Order::view)
            .collect()
    }

    pub fn visible_snapshot(&self) -> VisibleSnapshot {
        VisibleSnapshot::capture(self)
    }

    /// Tracked order by id, open or not.
    pub fn order(&self, id: &OrderId) -> Option<&Order> {
        self.open.get(id).or_else(|| self.unopened.get(id))
    }

    pub(crate) fn order_mut(&mut self, id: &OrderId) -> Option<&mut Order> {
        match self.open.get_mut(id) {
            Some(order) => Some(order),
            None => self.unopened.get_mut(id),
        }
    }

    pub(crate) fn view_of(&self, id: &OrderId) -> Option<OrderView> {
        self.order(id).map(Order::view)
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    /// Position of `order`'s price within its side's visible range.
    pub fn competitiveness(&self, order: &OrderView) -> Decimal {
        conversion::competitiveness(order.price, self.boundary(order.side))
    }

    /// Factor converting this product's sizes into the canonical asset.
    pub fn size_multiplier(&self) -> Decimal {
        let reference = self
            .cross
            .as_ref()
            .map(|cross| (cross.relation, cross.reference_price()));
        conversion::size_multiplier(&self.product, self.last_price, &self.canonical_asset, reference)
    }

    /// Take every event emitted since the last drain, in emission order.
    pub fn drain_events(&mut self) -> Vec<BookEvent> {
        std::mem::take(&mut self.outbox)
    }

    // === Internals ===

    pub(crate) fn changed(&mut self, id: &OrderId, removed_size: Decimal) {
        self.flush_pending_insert(id);
        if let Some(order) = self.view_of(id) {
            self.outbox.push(BookEvent::Changed { order, removed_size });
        }
    }

    fn set_last_price(&mut self, price: Price) {
        self.last_price = price;
        self.price_tx.send_replace(price);
    }

    /// Drop all book state. Visible orders are reported as removed first.
    /// The last price and the pre-seed buffer survive.
    fn clear(&mut self) {
        for side in [Side::Buy, Side::Sell] {
            for order in self.visible(side) {
                self.outbox.push(BookEvent::Removed { order });
            }
        }
        self.sequence.reset();
        self.unopened.clear();
        self.open.clear();
        self.bids.clear();
        self.asks.clear();
        self.bid_boundary = SideBoundary::default();
        self.ask_boundary = SideBoundary::default();
        self.pending_inserts.clear();
        self.next_number = 0;
    }
}
