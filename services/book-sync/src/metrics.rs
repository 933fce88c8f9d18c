//! Counters for the synchronization service
//!
//! Shared by every worker and the feed adapter. All counters are relaxed
//! atomics; a [`MetricsSnapshot`] is a point-in-time copy for logging.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::engine::ApplyOutcome;

#[derive(Debug, Default)]
pub struct SyncMetrics {
    // Message application
    pub messages_applied: AtomicU64,
    pub messages_buffered: AtomicU64,
    pub messages_stale: AtomicU64,
    pub sequence_gaps: AtomicU64,

    // Seeding
    pub resyncs: AtomicU64,
    pub seed_failures: AtomicU64,

    // Transport
    pub reconnects: AtomicU64,

    // Output
    pub events_published: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one message by how the engine handled it.
    pub fn record_outcome(&self, outcome: ApplyOutcome) {
        let counter = match outcome {
            ApplyOutcome::Applied => &self.messages_applied,
            ApplyOutcome::Buffered => &self.messages_buffered,
            ApplyOutcome::Stale => &self.messages_stale,
            ApplyOutcome::ResyncRequired => &self.sequence_gaps,
            ApplyOutcome::Ignored => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_seed_failure(&self) {
        self.seed_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_events(&self, count: usize) {
        self.events_published.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_applied: self.messages_applied.load(Ordering::Relaxed),
            messages_buffered: self.messages_buffered.load(Ordering::Relaxed),
            messages_stale: self.messages_stale.load(Ordering::Relaxed),
            sequence_gaps: self.sequence_gaps.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            seed_failures: self.seed_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
        }
    }
}

/// Serializable point-in-time metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_applied: u64,
    pub messages_buffered: u64,
    pub messages_stale: u64,
    pub sequence_gaps: u64,
    pub resyncs: u64,
    pub seed_failures: u64,
    pub reconnects: u64,
    pub events_published: u64,
}
