//! Snapshot and ticker retrieval
//!
//! The worker fetches the ticker first, then the book, through the
//! [`SnapshotSource`] seam. The HTTP implementation also reads plain file
//! paths so that recorded sample data can stand in for the REST API.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;
use types::ids::ProductId;

use crate::config::Endpoints;
use crate::error::FetchError;
use crate::messages::{BookSnapshot, Ticker};

const USER_AGENT: &str = concat!("book-sync/", env!("CARGO_PKG_VERSION"));

/// Where seed data comes from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_ticker(&self, product: &ProductId) -> Result<Ticker, FetchError>;

    async fn fetch_book(&self, product: &ProductId) -> Result<BookSnapshot, FetchError>;
}

/// REST (or local file) source driven by the configured URL templates.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpSnapshotSource {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_ticker(&self, product: &ProductId) -> Result<Ticker, FetchError> {
        fetch_json(&self.client, &self.endpoints.ticker_url_for(product)).await
    }

    async fn fetch_book(&self, product: &ProductId) -> Result<BookSnapshot, FetchError> {
        fetch_json(&self.client, &self.endpoints.book_url_for(product)).await
    }
}

pub(crate) fn is_http(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// GET an `http(s)://` URL or read a local file, then decode it as JSON.
pub async fn fetch_json<T: DeserializeOwned>(client: &reqwest::Client, location: &str) -> Result<T, FetchError> {
    let body = if is_http(location) {
        let response = client
            .get(location)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: location.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: location.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(|source| FetchError::Http {
            url: location.to_string(),
            source,
        })?
    } else {
        tokio::fs::read_to_string(location)
            .await
            .map_err(|source| FetchError::Io {
                path: location.to_string(),
                source,
            })?
    };
    debug!(location, bytes = body.len(), "Fetched document");

    serde_json::from_str(&body).map_err(|source| FetchError::Decode {
        origin: location.to_string(),
        source,
    })
}
