//! Error taxonomy for the synchronization service
//!
//! Nothing here is fatal to a running router: fetch failures are retried,
//! feed failures trigger a reconnect, and config errors stop startup only.
//! Sequence gaps, stale messages and unknown order references are not errors
//! at all; see [`crate::engine::ApplyOutcome`].

use thiserror::Error;
use types::ids::ProductId;

/// A snapshot, ticker or recorded-session document could not be loaded.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The push connection failed or the recorded session could not be replayed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("failed to encode subscribe request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to load recorded session: {0}")]
    Replay(#[from] FetchError),
}

/// Startup configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no products configured")]
    NoProducts,

    #[error("product {0} configured more than once")]
    DuplicateProduct(ProductId),

    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FetchError::Status {
            url: "https://example.test/book".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "https://example.test/book returned HTTP 503");

        let err = ConfigError::DuplicateProduct(ProductId::new("BTC-USD"));
        assert_eq!(err.to_string(), "product BTC-USD configured more than once");

        let err = FeedError::Closed;
        assert_eq!(err.to_string(), "connection closed by peer");
    }
}
