//! book-sync: keeps live top-of-book views for a set of products and logs
//! the resulting add/remove/change/transfer stream.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use book_sync::config::SyncConfig;
use book_sync::events::BookEvent;
use book_sync::router::InstrumentRouter;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use types::ids::ProductId;

/// Order-book synchronization service
#[derive(Parser, Debug)]
#[clap(name = "book-sync")]
#[clap(about = "Mirror the top of level-3 order books from a sequenced feed")]
struct Cli {
    /// JSON config file; flags override its values
    #[clap(long, env = "BOOK_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Product to synchronize (repeatable), e.g. BTC-USD
    #[clap(long = "product", env = "BOOK_SYNC_PRODUCTS", value_delimiter = ',')]
    products: Vec<ProductId>,

    /// Visible orders per side
    #[clap(long, env = "BOOK_SYNC_LIMIT")]
    limit: Option<usize>,

    /// Replay the recorded session in this directory instead of going live
    #[clap(long, env = "BOOK_SYNC_SAMPLE_DATA")]
    sample_data: Option<PathBuf>,

    /// Seconds between metrics log lines
    #[clap(long, default_value = "30")]
    metrics_interval: u64,
}

impl Cli {
    fn into_config(self) -> Result<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::from_file(path)?,
            None => SyncConfig::default(),
        };
        if let Some(dir) = &self.sample_data {
            config.endpoints = SyncConfig::sample_data(dir).endpoints;
        }
        if !self.products.is_empty() {
            config.products = self.products;
        }
        if self.limit.is_some() {
            config.limit = self.limit;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let metrics_interval = Duration::from_secs(cli.metrics_interval.max(1));
    let config = cli.into_config()?;
    info!(
        products = ?config.products,
        limit = ?config.limit,
        feed = %config.endpoints.feed_url,
        "Starting book-sync"
    );

    let mut router = InstrumentRouter::new(config).context("invalid configuration")?;
    for (product, reference) in router.references() {
        info!(product = %product, reference = %reference, "Sizes normalized through reference product");
    }
    let mut events = router.subscribe();
    router.open();

    let metrics = router.metrics();
    let mut ticker = tokio::time::interval(metrics_interval);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                info!(metrics = ?metrics.snapshot(), "Sync metrics");
            }
            received = events.recv() => match received {
                Ok(event) => match &event.event {
                    BookEvent::Ready => info!(product = %event.product, "Book ready"),
                    BookEvent::Transferred { size, price, side, .. } => {
                        debug!(product = %event.product, %size, %price, %side, "transfer");
                    }
                    other => debug!(product = %event.product, kind = other.kind_label(), "book event"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event consumer lagging"),
                Err(RecvError::Closed) => {
                    error!("Event channel closed");
                    break;
                }
            }
        }
    }

    router.close();
    Ok(())
}
