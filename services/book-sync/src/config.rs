//! Service configuration
//!
//! Every knob has a default matching the public Coinbase feed, so an empty
//! config file (or none at all) yields a working live setup for BTC-USD.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use types::ids::ProductId;

use crate::error::ConfigError;

/// Network locations for the feed and the snapshot/ticker documents.
///
/// `{product}` expands to the upper-case product id and `{product_lower}` to
/// its lower-case form. Any location that is not a `ws://`/`wss://` feed URL
/// or an `http(s)://` document URL is treated as a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub feed_url: String,
    pub book_url: String,
    pub ticker_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            feed_url: "wss://ws-feed.exchange.coinbase.com".to_string(),
            book_url: "https://api.exchange.coinbase.com/products/{product}/book?level=3".to_string(),
            ticker_url: "https://api.exchange.coinbase.com/products/{product}/ticker".to_string(),
        }
    }
}

impl Endpoints {
    /// Whether the feed is a live push connection rather than a recorded session.
    pub fn is_live_feed(&self) -> bool {
        self.feed_url.starts_with("ws://") || self.feed_url.starts_with("wss://")
    }

    pub fn book_url_for(&self, product: &ProductId) -> String {
        expand(&self.book_url, product)
    }

    pub fn ticker_url_for(&self, product: &ProductId) -> String {
        expand(&self.ticker_url, product)
    }
}

fn expand(template: &str, product: &ProductId) -> String {
    template
        .replace("{product_lower}", &product.as_str().to_lowercase())
        .replace("{product}", product.as_str())
}

/// Top-level configuration for the synchronization service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Products to synchronize.
    pub products: Vec<ProductId>,
    /// Visible orders per side; `None` tracks every resting order.
    pub limit: Option<usize>,
    /// Smoothing delay before a newly opened order becomes visible.
    pub insert_delay_ms: u64,
    /// Backoff after a failed snapshot or ticker fetch.
    pub seed_retry_delay_ms: u64,
    /// Backoff before reconnecting a dropped push connection.
    pub reconnect_delay_ms: u64,
    /// Messages buffered per product while no snapshot has been applied.
    pub preseed_capacity: usize,
    /// Asset that order sizes are normalized to across products.
    pub canonical_asset: String,
    /// Events buffered per subscriber before it starts lagging.
    pub event_capacity: usize,
    pub endpoints: Endpoints,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            products: vec![ProductId::new("BTC-USD")],
            limit: Some(10),
            insert_delay_ms: 2_000,
            seed_retry_delay_ms: 10_000,
            reconnect_delay_ms: 5_000,
            preseed_capacity: 10_000,
            canonical_asset: "BTC".to_string(),
            event_capacity: 4_096,
            endpoints: Endpoints::default(),
        }
    }
}

impl SyncConfig {
    /// Offline configuration replaying a recorded session from `dir`.
    pub fn sample_data(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().display().to_string();
        Self {
            endpoints: Endpoints {
                feed_url: format!("{dir}/socket.json"),
                book_url: format!("{dir}/book_{{product_lower}}.json"),
                ticker_url: format!("{dir}/ticker_{{product_lower}}.json"),
            },
            ..Self::default()
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Reject configurations the router cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.products.is_empty() {
            return Err(ConfigError::NoProducts);
        }
        let mut seen = BTreeSet::new();
        for product in &self.products {
            if !seen.insert(product) {
                return Err(ConfigError::DuplicateProduct(product.clone()));
            }
        }
        Ok(())
    }

    pub fn insert_delay(&self) -> Duration {
        Duration::from_millis(self.insert_delay_ms)
    }

    pub fn seed_retry_delay(&self) -> Duration {
        Duration::from_millis(self.seed_retry_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}
