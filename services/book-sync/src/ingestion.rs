//! Sequence tracking for incoming feed messages
//!
//! Enforces the per-product ordering rule: a message is applied only when
//! its sequence is exactly one past the last applied sequence. Anything at
//! or below is a duplicate; anything further ahead means messages were
//! lost and the book must be re-seeded from a snapshot.
//!
//! Before the first snapshot lands there is no sequence to compare with,
//! so messages are held verbatim in a bounded pre-seed queue instead.

use std::collections::VecDeque;

use tracing::warn;

use crate::messages::FeedMessage;

/// Classification of an incoming sequence number against the last applied one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Exactly the next expected message.
    Next,
    /// At or below the last applied sequence.
    Stale { last: u64 },
    /// Messages between `expected` and `actual` were never seen.
    Gap { expected: u64, actual: u64 },
}

/// Last applied sequence, or unseeded.
#[derive(Debug, Clone, Default)]
pub struct SequenceGate {
    last: Option<u64>,
}

impl SequenceGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }

    pub fn is_seeded(&self) -> bool {
        self.last.is_some()
    }

    /// Start over from a snapshot's sequence.
    pub fn seed(&mut self, sequence: u64) {
        self.last = Some(sequence);
    }

    /// Forget the sequence; messages must be buffered until the next seed.
    pub fn reset(&mut self) {
        self.last = None;
    }

    /// Classify `sequence`. Returns `None` while unseeded.
    pub fn check(&self, sequence: u64) -> Option<SequenceCheck> {
        let last = self.last?;
        let expected = last.saturating_add(1);
        Some(if sequence == expected {
            SequenceCheck::Next
        } else if sequence <= last {
            SequenceCheck::Stale { last }
        } else {
            SequenceCheck::Gap {
                expected,
                actual: sequence,
            }
        })
    }

    /// Record `sequence` as applied. Never moves backwards.
    pub fn advance(&mut self, sequence: u64) {
        if self.last.map_or(true, |last| sequence > last) {
            self.last = Some(sequence);
        }
    }
}

/// Messages received before the book was seeded, oldest first.
///
/// When full, the oldest message is dropped. Those messages predate the
/// snapshot that is about to be fetched, so they would be discarded as
/// stale anyway; a truly needed one surfaces later as a sequence gap.
#[derive(Debug, Clone)]
pub struct PreSeedQueue {
    messages: VecDeque<FeedMessage>,
    capacity: usize,
    dropped: u64,
}

impl PreSeedQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    /// Buffer a message. Returns false if the oldest message had to be dropped.
    pub fn push(&mut self, message: FeedMessage) -> bool {
        if self.capacity == 0 {
            self.dropped += 1;
            return false;
        }
        let mut kept_all = true;
        if self.messages.len() >= self.capacity {
            self.messages.pop_front();
            self.dropped += 1;
            kept_all = false;
            if self.dropped == 1 || self.dropped % 1000 == 0 {
                warn!(
                    capacity = self.capacity,
                    dropped = self.dropped,
                    "Pre-seed queue full, dropping oldest message"
                );
            }
        }
        self.messages.push_back(message);
        kept_all
    }

    /// Take all buffered messages in arrival order.
    pub fn drain(&mut self) -> Vec<FeedMessage> {
        self.dropped = 0;
        self.messages.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages dropped since the last drain.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageBody;
    use types::ids::{OrderId, ProductId};
    use types::order::Side;

    fn message(sequence: u64) -> FeedMessage {
        FeedMessage {
            product_id: ProductId::new("BTC-USD"),
            sequence,
            time: None,
            body: MessageBody::Change {
                order_id: OrderId::new("a"),
                side: Side::Buy,
                new_size: Default::default(),
                price: None,
            },
        }
    }

    #[test]
    fn test_unseeded_gate_has_no_verdict() {
        let gate = SequenceGate::new();
        assert!(!gate.is_seeded());
        assert_eq!(gate.check(1), None);
    }

    #[test]
    fn test_sequence_classification() {
        let mut gate = SequenceGate::new();
        gate.seed(5);
        assert_eq!(gate.check(6), Some(SequenceCheck::Next));
        assert_eq!(gate.check(5), Some(SequenceCheck::Stale { last: 5 }));
        assert_eq!(gate.check(2), Some(SequenceCheck::Stale { last: 5 }));
        assert_eq!(
            gate.check(7),
            Some(SequenceCheck::Gap { expected: 6, actual: 7 })
        );
    }

    #[test]
    fn test_advance_is_monotonic() {
        let mut gate = SequenceGate::new();
        gate.seed(5);
        gate.advance(6);
        gate.advance(3);
        assert_eq!(gate.last(), Some(6));
        gate.reset();
        assert_eq!(gate.last(), None);
    }

    #[test]
    fn test_queue_preserves_arrival_order() {
        let mut queue = PreSeedQueue::new(10);
        for seq in [3, 1, 2] {
            assert!(queue.push(message(seq)));
        }
        let drained: Vec<u64> = queue.drain().iter().map(|m| m.sequence).collect();
        assert_eq!(drained, vec![3, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let mut queue = PreSeedQueue::new(2);
        queue.push(message(1));
        queue.push(message(2));
        assert!(!queue.push(message(3)));
        assert_eq!(queue.dropped(), 1);
        let drained: Vec<u64> = queue.drain().iter().map(|m| m.sequence).collect();
        assert_eq!(drained, vec![2, 3]);
        assert_eq!(queue.dropped(), 0);
    }
}
