//! Error types for the ingestion pipeline.
//!
//! The taxonomy separates per-event faults (decode, enrichment, store) from
//! setup faults (config, store open). Per-event errors are caught at the
//! event boundary by the pipeline and never propagate to the subscription
//! loop; only setup errors may terminate the process.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// A payload failed to decode (or a record failed to encode).
    /// Per-event; the event is dropped.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The scoring service could not be reached or answered with an error
    /// status. Retryable by a future event, not retried within the call.
    #[error("scoring service unavailable: {0}")]
    EnrichmentUnavailable(#[source] reqwest::Error),

    /// The scoring response was missing an expected field. Non-retryable;
    /// the event is dropped.
    #[error("scoring response malformed: {0}")]
    EnrichmentMalformed(String),

    /// RocksDB storage error.
    #[error("store error: {0}")]
    Store(#[from] rocksdb::Error),

    /// The event channel closed unexpectedly.
    #[error("event channel closed")]
    ChannelClosed,

    /// Configuration error (setup-time, fatal).
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error classifies as a malformed scoring response, as
    /// opposed to the service being unreachable.
    pub fn is_malformed_enrichment(&self) -> bool {
        matches!(self, Error::EnrichmentMalformed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Display formatting
    // =========================================================================

    #[test]
    fn enrichment_malformed_display() {
        let err = Error::EnrichmentMalformed("missing key 'scores'".to_string());
        let msg = err.to_string();
        assert!(msg.contains("scoring response malformed"));
        assert!(msg.contains("missing key 'scores'"));
        assert!(err.is_malformed_enrichment());
    }

    #[test]
    fn config_display() {
        let err = Error::Config("no wikis configured".to_string());
        assert!(err.to_string().contains("configuration error"));
        assert!(!err.is_malformed_enrichment());
    }

    #[test]
    fn channel_closed_display() {
        assert_eq!(Error::ChannelClosed.to_string(), "event channel closed");
    }

    // =========================================================================
    // From conversions
    // =========================================================================

    #[test]
    fn from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().contains("JSON error"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("gone"));
    }
}
