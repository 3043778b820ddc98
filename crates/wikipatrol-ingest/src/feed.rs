//! Live recent-change feed source.
//!
//! Maintains a persistent EventStreams (SSE) subscription to the Wikimedia
//! recent-change feed and pushes decoded events into a bounded channel
//! consumed by the pipeline.
//!
//! # Reconnection
//!
//! The underlying `reqwest-eventsource` transport retries the connection on
//! transient failures; this source logs transport errors and keeps reading.
//! The stream only ends when the pipeline side of the channel goes away or
//! shutdown is requested.
//!
//! # Decode faults
//!
//! A malformed payload is a per-event fault: it is logged, counted, and
//! dropped. It never terminates the subscription.

use crate::error::Result;
use futures_util::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use wikipatrol_core::RawChangeEvent;

/// Default Wikimedia EventStreams recent-change endpoint.
pub const DEFAULT_FEED_URL: &str = "https://stream.wikimedia.org/v2/stream/recentchange";

/// Configuration for the feed source.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Stream URL to subscribe to.
    pub url: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_FEED_URL.to_string(),
        }
    }
}

/// Snapshot of feed counters, reported at shutdown.
#[derive(Debug, Clone, Default)]
pub struct FeedStats {
    /// Messages received from the stream.
    pub received: usize,
    /// Messages that decoded into a [`RawChangeEvent`].
    pub decoded: usize,
    /// Messages dropped because decoding failed.
    pub decode_errors: usize,
    /// Transient transport errors (the transport reconnects on its own).
    pub transport_errors: usize,
    /// Times the connection was opened.
    pub connections: usize,
}

#[derive(Default)]
struct FeedCounters {
    received: AtomicUsize,
    decoded: AtomicUsize,
    decode_errors: AtomicUsize,
    transport_errors: AtomicUsize,
    connections: AtomicUsize,
}

/// Live feed source over SSE.
pub struct FeedSource {
    config: FeedConfig,
    running: Arc<AtomicBool>,
    counters: Arc<FeedCounters>,
}

impl FeedSource {
    /// Create a feed source. The `running` flag is shared with the process
    /// shutdown handler; flipping it to `false` ends the subscription loop.
    pub fn new(config: FeedConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            config,
            running,
            counters: Arc::new(FeedCounters::default()),
        }
    }

    /// Run the subscription loop, sending decoded events into `tx`.
    ///
    /// Returns the feed counters once the loop ends (shutdown requested or
    /// the receiving side of the channel dropped).
    pub async fn run(&self, tx: mpsc::Sender<RawChangeEvent>) -> FeedStats {
        tracing::info!("Connecting to event stream at {}", self.config.url);

        let mut stream = EventSource::get(self.config.url.as_str());

        while self.running.load(Ordering::SeqCst) {
            // Poll with a timeout so the running flag is rechecked even when
            // the stream is quiet.
            let item = match tokio::time::timeout(Duration::from_secs(1), stream.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    tracing::info!("Event stream terminated");
                    break;
                }
                Err(_) => continue,
            };

            match item {
                Ok(Event::Open) => {
                    self.counters.connections.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("feed_connections_total").increment(1);
                    tracing::info!("Event stream connection opened");
                }
                Ok(Event::Message(msg)) => {
                    self.counters.received.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("feed_events_total").increment(1);

                    match decode_event(&msg.data) {
                        Ok(event) => {
                            self.counters.decoded.fetch_add(1, Ordering::Relaxed);
                            if tx.send(event).await.is_err() {
                                tracing::info!("Event channel closed, stopping feed");
                                break;
                            }
                        }
                        Err(e) => {
                            self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                            metrics::counter!("feed_decode_errors_total").increment(1);
                            tracing::warn!("Dropping undecodable feed message: {}", e);
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    // The transport reconnects; nothing to do but note it.
                    self.counters.transport_errors.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("feed_transport_errors_total").increment(1);
                    tracing::debug!("Event stream ended, transport will reconnect");
                }
                Err(e) => {
                    self.counters.transport_errors.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("feed_transport_errors_total").increment(1);
                    tracing::warn!("Event stream transport error: {}", e);
                }
            }
        }

        stream.close();
        self.stats()
    }

    /// Snapshot the feed counters.
    pub fn stats(&self) -> FeedStats {
        FeedStats {
            received: self.counters.received.load(Ordering::Relaxed),
            decoded: self.counters.decoded.load(Ordering::Relaxed),
            decode_errors: self.counters.decode_errors.load(Ordering::Relaxed),
            transport_errors: self.counters.transport_errors.load(Ordering::Relaxed),
            connections: self.counters.connections.load(Ordering::Relaxed),
        }
    }
}

/// Decode one stream message payload into a raw event.
pub fn decode_event(data: &str) -> Result<RawChangeEvent> {
    Ok(serde_json::from_str(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikipatrol_core::{ChangeType, Revision};

    #[test]
    fn decode_event_accepts_feed_payload() {
        let data = r#"{
            "wiki": "enwiki",
            "type": "edit",
            "id": 1,
            "revision": {"old": 10, "new": 11},
            "title": "A",
            "user": "u1",
            "timestamp": 1000,
            "meta": {"uri": "https://en.wikipedia.org/wiki/A"},
            "bot": false,
            "server_name": "en.wikipedia.org"
        }"#;
        let event = decode_event(data).unwrap();
        assert_eq!(event.change_type, ChangeType::Edit);
        assert_eq!(event.revision, Some(Revision { old: Some(10), new: 11 }));
        assert_eq!(event.identity(), "enwiki-1");
    }

    #[test]
    fn decode_event_rejects_garbage() {
        assert!(decode_event("not json").is_err());
        assert!(decode_event("").is_err());
        // Valid JSON, wrong shape.
        assert!(decode_event(r#"{"wiki": "enwiki"}"#).is_err());
    }

    #[test]
    fn default_config_points_at_wikimedia() {
        let config = FeedConfig::default();
        assert_eq!(config.url, DEFAULT_FEED_URL);
    }
}
