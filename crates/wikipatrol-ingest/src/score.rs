//! ORES scoring client.
//!
//! Fetches `damaging` and `goodfaith` model scores for a single revision.
//! Each accepted event triggers exactly one request; nothing is cached.
//! Scoring is idempotent on the service side (same revision, same score),
//! so a failed call is skipped rather than retried.
//!
//! # Error classification
//!
//! - Transport failures and error statuses are [`Error::EnrichmentUnavailable`].
//! - A response that is not JSON, or is missing the expected nested fields,
//!   is [`Error::EnrichmentMalformed`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};
use wikipatrol_core::OresScores;

/// Default ORES scoring host.
pub const DEFAULT_ORES_URL: &str = "https://ores.wmflabs.org";

/// Configuration for the ORES client.
#[derive(Debug, Clone)]
pub struct OresConfig {
    /// Scoring host, e.g. `https://ores.wmflabs.org`.
    pub base_url: String,

    /// Per-request timeout. A bound keeps a stalled scoring call from
    /// pinning its event's task forever.
    pub timeout: Duration,
}

impl Default for OresConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ORES_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Something that can score a revision.
///
/// The pipeline depends on this seam rather than on [`OresClient`] directly
/// so tests can substitute a fake.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Fetch scores for `rev_id` on `wiki`.
    async fn score(&self, wiki: &str, rev_id: i64) -> Result<OresScores>;
}

/// HTTP client for the ORES scoring service.
pub struct OresClient {
    client: reqwest::Client,
    config: OresConfig,
}

impl OresClient {
    /// Build a client with the configured timeout.
    pub fn new(config: OresConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            "ORES client initialized: url={}, timeout={:?}",
            config.base_url,
            config.timeout
        );

        Ok(Self { client, config })
    }

    /// Scoring URL for one revision, both models in a single request.
    fn score_url(&self, wiki: &str, rev_id: i64) -> String {
        format!(
            "{}/v3/scores/{}/?models=damaging|goodfaith&revids={}",
            self.config.base_url.trim_end_matches('/'),
            wiki,
            rev_id
        )
    }

    async fn fetch(&self, wiki: &str, rev_id: i64) -> Result<OresScores> {
        let url = self.score_url(wiki, rev_id);
        metrics::counter!("score_requests_total").increment(1);
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(Error::EnrichmentUnavailable)?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::EnrichmentMalformed(format!("response is not JSON: {e}")))?;

        metrics::histogram!("score_duration_seconds").record(started.elapsed().as_secs_f64());

        extract_scores(&body, wiki, rev_id)
    }
}

#[async_trait]
impl Scorer for OresClient {
    async fn score(&self, wiki: &str, rev_id: i64) -> Result<OresScores> {
        self.fetch(wiki, rev_id).await
    }
}

/// Pull the two probabilities out of an ORES v3 response body.
///
/// Expected shape:
/// `{<wiki>: {scores: {<rev>: {damaging: {score: {probability: {true: f}}},
/// goodfaith: {score: {probability: {false: f}}}}}}}`.
pub fn extract_scores(body: &Value, wiki: &str, rev_id: i64) -> Result<OresScores> {
    let rev = rev_id.to_string();
    let damaging = lookup_f64(
        body,
        &[wiki, "scores", &rev, "damaging", "score", "probability", "true"],
    )?;
    let badfaith = lookup_f64(
        body,
        &[wiki, "scores", &rev, "goodfaith", "score", "probability", "false"],
    )?;
    Ok(OresScores { damaging, badfaith })
}

/// Walk a key path through the response, failing with the partial path that
/// was missing.
fn lookup_f64(body: &Value, path: &[&str]) -> Result<f64> {
    let mut current = body;
    for (i, key) in path.iter().enumerate() {
        current = current.get(key).ok_or_else(|| {
            Error::EnrichmentMalformed(format!("missing field '{}'", path[..=i].join(".")))
        })?;
    }
    current.as_f64().ok_or_else(|| {
        Error::EnrichmentMalformed(format!("field '{}' is not a number", path.join(".")))
    })
}
