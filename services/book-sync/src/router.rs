//! Instrument router
//!
//! Owns the feed adapter and one worker per product. Messages from the feed
//! are fanned out by `product_id`; every worker's events are re-emitted on
//! one broadcast channel tagged with their product.
//!
//! At startup each product that does not trade against the canonical asset
//! is linked to a configured product that does and shares one of its legs,
//! so its sizes can be normalized through that product's last price.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use types::ids::ProductId;

use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::error::ConfigError;
use crate::events::ProductEvent;
use crate::feed::FeedAdapter;
use crate::messages::FeedMessage;
use crate::metrics::SyncMetrics;
use crate::order::OrderView;
use crate::snapshot::VisibleSnapshot;
use crate::source::{HttpSnapshotSource, SnapshotSource};
use crate::worker::{BookWorker, WorkerCommand, INBOX_CAPACITY};

/// For every product not quoted in `canonical`, the first product that
/// contains `canonical` and shares its base leg, or failing that its quote
/// leg.
pub fn assign_relations(products: &[ProductId], canonical: &str) -> BTreeMap<ProductId, ProductId> {
    let mut relations = BTreeMap::new();
    for product in products {
        if product.has_leg(canonical) {
            continue;
        }
        let (base, quote) = product.legs();
        let reference = [base, quote].into_iter().find_map(|leg| {
            products
                .iter()
                .find(|other| *other != product && other.has_leg(canonical) && other.has_leg(leg))
        });
        if let Some(reference) = reference {
            relations.insert(product.clone(), reference.clone());
        }
    }
    relations
}

pub struct InstrumentRouter {
    config: SyncConfig,
    references: BTreeMap<ProductId, ProductId>,
    events: broadcast::Sender<ProductEvent>,
    metrics: Arc<SyncMetrics>,
    workers: BTreeMap<ProductId, mpsc::Sender<WorkerCommand>>,
    tasks: Vec<JoinHandle<()>>,
}

impl InstrumentRouter {
    pub fn new(config: SyncConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let references = assign_relations(&config.products, &config.canonical_asset);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Ok(Self {
            config,
            references,
            events,
            metrics: Arc::new(SyncMetrics::new()),
            workers: BTreeMap::new(),
            tasks: Vec::new(),
        })
    }

    /// Receive every product's events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<ProductEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn products(&self) -> &[ProductId] {
        &self.config.products
    }

    /// Cross-conversion reference chosen for each product, if any.
    pub fn references(&self) -> &BTreeMap<ProductId, ProductId> {
        &self.references
    }

    pub fn is_open(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Start workers against the configured REST endpoints and connect the feed.
    pub fn open(&mut self) {
        let source = Arc::new(HttpSnapshotSource::new(self.config.endpoints.clone()));
        let feed_tx = self.open_with_source(source);
        let adapter = FeedAdapter::new(&self.config, Arc::clone(&self.metrics));
        self.tasks.push(adapter.spawn(feed_tx));
    }

    /// Start one worker per product seeded from `source`, plus the
    /// dispatcher. Returns the sender the feed should write into.
    ///
    /// Reopening an open router closes it first.
    pub fn open_with_source(&mut self, source: Arc<dyn SnapshotSource>) -> mpsc::Sender<FeedMessage> {
        if self.is_open() {
            self.close();
        }

        let mut engines: BTreeMap<ProductId, SyncEngine> = self
            .config
            .products
            .iter()
            .map(|product| (product.clone(), SyncEngine::new(product.clone(), &self.config)))
            .collect();

        let feeds: BTreeMap<ProductId, _> = engines
            .iter()
            .map(|(product, engine)| (product.clone(), engine.price_feed()))
            .collect();
        for (product, reference) in &self.references {
            if let (Some(engine), Some(price)) = (engines.get_mut(product), feeds.get(reference)) {
                engine.set_cross_conversion(reference.clone(), price.clone());
            }
        }

        for (product, engine) in engines {
            let (worker, tx) = BookWorker::new(
                engine,
                Arc::clone(&source),
                self.events.clone(),
                Arc::clone(&self.metrics),
                self.config.seed_retry_delay(),
            );
            self.tasks.push(worker.spawn());
            self.workers.insert(product, tx);
        }

        let (feed_tx, feed_rx) = mpsc::channel(INBOX_CAPACITY);
        self.tasks.push(tokio::spawn(dispatch(feed_rx, self.workers.clone())));
        info!(products = self.workers.len(), references = self.references.len(), "Router open");
        feed_tx
    }

    /// Stop the feed, the dispatcher and every worker.
    pub fn close(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.workers.clear();
        info!("Router closed");
    }

    /// Visible book of one product.
    pub async fn snapshot(&self, product: &ProductId) -> Option<VisibleSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.workers.get(product)?.send(WorkerCommand::Snapshot(tx)).await.ok()?;
        rx.await.ok()
    }

    /// Competitiveness of `order` within its product's visible range.
    pub async fn competitiveness(&self, order: &OrderView) -> Option<Decimal> {
        let (tx, rx) = oneshot::channel();
        self.workers
            .get(&order.product)?
            .send(WorkerCommand::Competitiveness(order.clone(), tx))
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Factor converting `product` sizes into the canonical asset.
    pub async fn size_multiplier(&self, product: &ProductId) -> Option<Decimal> {
        let (tx, rx) = oneshot::channel();
        self.workers.get(product)?.send(WorkerCommand::SizeMultiplier(tx)).await.ok()?;
        rx.await.ok()
    }
}

impl Drop for InstrumentRouter {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

async fn dispatch(mut rx: mpsc::Receiver<FeedMessage>, workers: BTreeMap<ProductId, mpsc::Sender<WorkerCommand>>) {
    while let Some(message) = rx.recv().await {
        let Some(worker) = workers.get(&message.product_id) else {
            debug!(product = %message.product_id, "Message for unconfigured product");
            continue;
        };
        let product = message.product_id.clone();
        if worker.send(WorkerCommand::Feed(message)).await.is_err() {
            error!(product = %product, "Worker stopped, dropping its messages");
        }
    }
}
