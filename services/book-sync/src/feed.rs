//! Feed adapter
//!
//! Delivers decoded [`FeedMessage`]s to the router from one of two
//! transports:
//!
//! - **Live**: a WebSocket to the venue. On connect a subscribe request for
//!   every product is sent; when the connection drops the adapter waits the
//!   reconnect delay and subscribes again. Only one reconnect is ever
//!   pending because the session loop runs them one after another.
//! - **Replay**: a recorded message array (URL or file) played back with
//!   its original spacing.
//!
//! Closing the router aborts the adapter task; an abort never reconnects.
//! Likewise, once the router stops listening the adapter ends quietly.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use types::ids::ProductId;

use crate::config::SyncConfig;
use crate::error::FeedError;
use crate::messages::{ControlMessage, FeedMessage};
use crate::metrics::SyncMetrics;
use crate::replay;

/// How a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The router dropped its receiver; stop for good.
    ConsumerGone,
}

pub struct FeedAdapter {
    url: String,
    live: bool,
    products: Vec<ProductId>,
    reconnect_delay: Duration,
    client: reqwest::Client,
    metrics: Arc<SyncMetrics>,
}

impl FeedAdapter {
    pub fn new(config: &SyncConfig, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            url: config.endpoints.feed_url.clone(),
            live: config.endpoints.is_live_feed(),
            products: config.products.clone(),
            reconnect_delay: config.reconnect_delay(),
            client: reqwest::Client::new(),
            metrics,
        }
    }

    /// Run the adapter on its own task, forwarding messages into `tx`.
    pub fn spawn(self, tx: mpsc::Sender<FeedMessage>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if self.live {
                self.run_live(tx).await;
            } else {
                self.run_replay(tx).await;
            }
        })
    }

    async fn run_live(self, tx: mpsc::Sender<FeedMessage>) {
        loop {
            match self.session(&tx).await {
                Ok(SessionEnd::ConsumerGone) => {
                    info!(url = %self.url, "Feed consumer gone, stopping");
                    return;
                }
                Err(e) => {
                    warn!(
                        url = %self.url,
                        error = %e,
                        delay_ms = self.reconnect_delay.as_millis() as u64,
                        "Feed connection lost, reconnecting"
                    );
                    self.metrics.record_reconnect();
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
            if tx.is_closed() {
                return;
            }
        }
    }

    /// One connection, from handshake until it fails or the consumer leaves.
    async fn session(&self, tx: &mpsc::Sender<FeedMessage>) -> Result<SessionEnd, FeedError> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|source| FeedError::Connect {
                url: self.url.clone(),
                source,
            })?;
        let (mut write, mut read) = stream.split();

        let subscribe = ControlMessage::Subscribe {
            product_ids: self.products.clone(),
        };
        write.send(Message::Text(serde_json::to_string(&subscribe)?)).await?;
        info!(url = %self.url, products = self.products.len(), "Feed connected and subscribed");

        while let Some(frame) = read.next().await {
            match frame? {
                Message::Text(text) => {
                    let Some(message) = decode_message(&text) else {
                        continue;
                    };
                    if tx.send(message).await.is_err() {
                        return Ok(SessionEnd::ConsumerGone);
                    }
                }
                Message::Close(frame) => {
                    debug!(?frame, "Feed closed by peer");
                    return Err(FeedError::Closed);
                }
                // Pings are answered by tungstenite; binary frames are not used by the venue.
                _ => {}
            }
        }
        Err(FeedError::Closed)
    }

    async fn run_replay(self, tx: mpsc::Sender<FeedMessage>) {
        match replay::load_session(&self.client, &self.url).await {
            Ok(entries) => {
                replay::play(entries, tx).await;
            }
            Err(e) => warn!(url = %self.url, error = %e, "Failed to load recorded session"),
        }
    }
}

/// Decode one text frame. Returns `None` for anything the engine does not consume.
pub fn decode_message(text: &str) -> Option<FeedMessage> {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Discarding non-JSON frame");
            return None;
        }
    };
    match value.get("type").and_then(Value::as_str) {
        Some("error") => {
            warn!(message = ?value.get("message"), reason = ?value.get("reason"), "Venue reported an error");
            return None;
        }
        Some("subscriptions") => {
            info!(channels = ?value.get("channels"), "Subscription confirmed");
            return None;
        }
        _ => {}
    }
    match serde_json::from_value::<FeedMessage>(value) {
        Ok(message) => Some(message),
        Err(e) => {
            debug!(error = %e, "Skipping message the engine does not consume");
            None
        }
    }
}
