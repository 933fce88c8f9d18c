//! Per-product worker task
//!
//! Owns one [`SyncEngine`] and is the only code that mutates it. Feed
//! messages, seed results, due insertions and retry timers all arrive
//! through a single `select!` loop, so they are applied strictly one at a
//! time. After every step the engine's new events are published on the
//! shared broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use types::ids::ProductId;

use crate::engine::{ApplyOutcome, SyncEngine};
use crate::error::FetchError;
use crate::events::ProductEvent;
use crate::messages::{BookSnapshot, FeedMessage, Ticker};
use crate::metrics::SyncMetrics;
use crate::order::OrderView;
use crate::snapshot::VisibleSnapshot;
use crate::source::SnapshotSource;

/// Commands queued per worker before the feed is back-pressured.
pub const INBOX_CAPACITY: usize = 4_096;

type SeedResult = Result<(Ticker, BookSnapshot), FetchError>;

/// Requests accepted by a running worker.
#[derive(Debug)]
pub enum WorkerCommand {
    Feed(FeedMessage),
    Snapshot(oneshot::Sender<VisibleSnapshot>),
    Competitiveness(OrderView, oneshot::Sender<Decimal>),
    SizeMultiplier(oneshot::Sender<Decimal>),
}

pub struct BookWorker {
    engine: SyncEngine,
    source: Arc<dyn SnapshotSource>,
    inbox: mpsc::Receiver<WorkerCommand>,
    events: broadcast::Sender<ProductEvent>,
    metrics: Arc<SyncMetrics>,
    retry_delay: Duration,
    seed_tx: mpsc::Sender<SeedResult>,
    seed_rx: mpsc::Receiver<SeedResult>,
    seed_task: Option<JoinHandle<()>>,
    retry_at: Option<Instant>,
}

impl BookWorker {
    pub fn new(
        engine: SyncEngine,
        source: Arc<dyn SnapshotSource>,
        events: broadcast::Sender<ProductEvent>,
        metrics: Arc<SyncMetrics>,
        retry_delay: Duration,
    ) -> (Self, mpsc::Sender<WorkerCommand>) {
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (seed_tx, seed_rx) = mpsc::channel(1);
        let worker = Self {
            engine,
            source,
            inbox,
            events,
            metrics,
            retry_delay,
            seed_tx,
            seed_rx,
            seed_task: None,
            retry_at: None,
        };
        (worker, tx)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Seed, then process until every command sender is dropped.
    pub async fn run(mut self) {
        self.request_seed();

        loop {
            let insert_due = self.engine.next_insert_due();
            let retry_at = self.retry_at;

            tokio::select! {
                command = self.inbox.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(result) = self.seed_rx.recv() => self.handle_seed_result(result),
                _ = sleep_until(insert_due.unwrap_or_else(Instant::now)), if insert_due.is_some() => {
                    self.engine.fire_due_inserts(Instant::now());
                }
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.request_seed();
                }
            }

            self.publish();
        }

        debug!(product = %self.engine.product(), "Worker inbox closed, stopping");
    }

    fn handle_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Feed(message) => {
                let now = Instant::now();
                // Insertions that came due while this message was queued go first.
                self.engine.fire_due_inserts(now);
                let outcome = self.engine.handle_message(message, now);
                self.metrics.record_outcome(outcome);
                if outcome == ApplyOutcome::ResyncRequired {
                    self.request_seed();
                }
            }
            WorkerCommand::Snapshot(reply) => {
                let _ = reply.send(self.engine.visible_snapshot());
            }
            WorkerCommand::Competitiveness(order, reply) => {
                let _ = reply.send(self.engine.competitiveness(&order));
            }
            WorkerCommand::SizeMultiplier(reply) => {
                let _ = reply.send(self.engine.size_multiplier());
            }
        }
    }

    /// Start a snapshot fetch unless one is already in flight.
    fn request_seed(&mut self) {
        if !self.engine.begin_seed() {
            return;
        }
        self.retry_at = None;
        self.metrics.record_resync();

        let source = Arc::clone(&self.source);
        let product = self.engine.product().clone();
        let tx = self.seed_tx.clone();
        info!(product = %product, "Fetching book snapshot");
        self.seed_task = Some(tokio::spawn(async move {
            let result = fetch_seed(source.as_ref(), &product).await;
            let _ = tx.send(result).await;
        }));
    }

    fn handle_seed_result(&mut self, result: SeedResult) {
        self.seed_task = None;
        match result {
            Ok((ticker, book)) => {
                let outcome = self.engine.apply_seed(ticker, book, Instant::now());
                if outcome == ApplyOutcome::ResyncRequired {
                    self.metrics.record_outcome(outcome);
                    self.request_seed();
                } else {
                    info!(
                        product = %self.engine.product(),
                        sequence = ?self.engine.last_sequence(),
                        price = %self.engine.last_price(),
                        "Book ready"
                    );
                }
            }
            Err(e) => {
                warn!(
                    product = %self.engine.product(),
                    error = %e,
                    retry_ms = self.retry_delay.as_millis() as u64,
                    "Snapshot fetch failed, retrying"
                );
                self.metrics.record_seed_failure();
                self.engine.seed_failed();
                self.retry_at = Some(Instant::now() + self.retry_delay);
            }
        }
    }

    fn publish(&mut self) {
        let events = self.engine.drain_events();
        if events.is_empty() {
            return;
        }
        self.metrics.record_events(events.len());
        let product = self.engine.product().clone();
        for event in events {
            // Having no subscribers is fine.
            let _ = self.events.send(ProductEvent {
                product: product.clone(),
                event,
            });
        }
    }
}

impl Drop for BookWorker {
    fn drop(&mut self) {
        if let Some(task) = self.seed_task.take() {
            task.abort();
        }
    }
}

async fn fetch_seed(source: &dyn SnapshotSource, product: &ProductId) -> SeedResult {
    let ticker = source.fetch_ticker(product).await?;
    let book = source.fetch_book(product).await?;
    Ok((ticker, book))
}
