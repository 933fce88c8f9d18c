//! Recorded-session playback
//!
//! Stands in for the push connection when the feed location is a recorded
//! JSON array of raw socket messages. Entries are delivered one at a time,
//! spaced by the difference between consecutive `time` stamps, so the
//! engine sees the same pacing (and the same insertion-delay behavior) as
//! it would live.
//!
//! Entries that are not order-lifecycle messages are still used for pacing
//! but are not forwarded.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::FeedError;
use crate::messages::FeedMessage;
use crate::source::fetch_json;

/// One recorded socket message.
#[derive(Debug, Clone)]
pub struct RecordedEntry {
    pub time: Option<DateTime<Utc>>,
    /// `None` for messages the engine does not consume.
    pub message: Option<FeedMessage>,
}

impl RecordedEntry {
    pub fn from_value(value: Value) -> Self {
        let time = value
            .get("time")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|time| time.with_timezone(&Utc));
        let message = serde_json::from_value(value).ok();
        Self { time, message }
    }
}

/// Load a recorded session from a URL or file.
pub async fn load_session(client: &reqwest::Client, location: &str) -> Result<Vec<RecordedEntry>, FeedError> {
    let raw: Vec<Value> = fetch_json(client, location).await?;
    Ok(raw.into_iter().map(RecordedEntry::from_value).collect())
}

/// Wait between delivering `current` and `next`.
///
/// Zero when either timestamp is missing or they run backwards.
pub fn delay_between(current: &RecordedEntry, next: &RecordedEntry) -> Duration {
    match (current.time, next.time) {
        (Some(current), Some(next)) => (next - current).to_std().unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

/// Deliver `entries` to `tx` with their recorded spacing.
///
/// Returns the number of messages forwarded. Stops early if the receiver
/// is dropped.
pub async fn play(entries: Vec<RecordedEntry>, tx: mpsc::Sender<FeedMessage>) -> usize {
    info!(entries = entries.len(), "Replaying recorded session");
    let mut forwarded = 0;
    let mut iter = entries.into_iter().peekable();

    while let Some(entry) = iter.next() {
        let wait = iter.peek().map(|next| delay_between(&entry, next));
        if let Some(message) = entry.message {
            if tx.send(message).await.is_err() {
                debug!(forwarded, "Replay receiver dropped, stopping");
                return forwarded;
            }
            forwarded += 1;
        }
        match wait {
            Some(wait) if !wait.is_zero() => tokio::time::sleep(wait).await,
            _ => {}
        }
    }

    info!(forwarded, "Recorded session finished");
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::Instant;

    fn entry(sequence: u64, time: &str) -> Value {
        json!({
            "type": "received",
            "product_id": "BTC-USD",
            "sequence": sequence,
            "time": time,
            "order_id": format!("o{sequence}"),
            "side": "buy",
            "price": "10.00",
            "size": "1.0",
            "order_type": "limit"
        })
    }

    #[test]
    fn test_delay_between_uses_recorded_times() {
        let a = RecordedEntry::from_value(entry(1, "2016-01-01T00:00:00.000Z"));
        let b = RecordedEntry::from_value(entry(2, "2016-01-01T00:00:01.250Z"));
        assert_eq!(delay_between(&a, &b), Duration::from_millis(1250));
        assert_eq!(delay_between(&b, &a), Duration::ZERO);

        let untimed = RecordedEntry::from_value(json!({"type": "heartbeat"}));
        assert!(untimed.message.is_none());
        assert_eq!(delay_between(&a, &untimed), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_paces_and_skips_foreign_messages() {
        let entries = vec![
            RecordedEntry::from_value(entry(1, "2016-01-01T00:00:00Z")),
            RecordedEntry::from_value(json!({"type": "subscriptions", "time": "2016-01-01T00:00:01Z"})),
            RecordedEntry::from_value(entry(2, "2016-01-01T00:00:03Z")),
        ];
        let (tx, mut rx) = mpsc::channel(8);
        let start = Instant::now();
        let handle = tokio::spawn(play(entries, tx));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.sequence, 1);
        assert!(start.elapsed() < Duration::from_millis(10));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.sequence, 2);
        assert!(start.elapsed() >= Duration::from_secs(3));

        assert_eq!(handle.await.unwrap(), 2);
        assert!(rx.recv().await.is_none());
    }
}
