//! Pipeline orchestrator: receive -> filter -> enrich -> store.
//!
//! Each decoded event is dispatched to its own task, so one event's slow
//! scoring call or store write never blocks the rest of the stream. A
//! semaphore caps the number of in-flight events; past the cap,
//! backpressure propagates into the bounded feed channel.
//!
//! # Failure isolation
//!
//! Every per-event error is converted into a terminal [`Outcome`] at the
//! event boundary. There are no retry edges: a terminal outcome ends that
//! event's processing permanently, and the next event is unaffected. Only
//! setup failures (handled in `main`) may terminate the process.

use crate::filter::EventFilter;
use crate::score::Scorer;
use crate::store::{InsertOutcome, RecordStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use wikipatrol_core::{EnrichedChangeRecord, RawChangeEvent};

/// Configuration for the pipeline orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum number of events being enriched/stored concurrently.
    pub max_in_flight: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_in_flight: 64 }
    }
}

/// Terminal state of one event's processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Dropped by the filter (not an edit, or wiki not allow-listed).
    Rejected,
    /// An accepted edit carried no revision descriptor.
    Invalid,
    /// The scoring call failed; the event was dropped.
    EnrichFailed,
    /// The enriched record was persisted.
    Stored,
    /// The identity already existed; treated as success.
    Duplicate,
    /// The store insert failed; the event was dropped.
    StoreFailed,
}

#[derive(Default)]
struct PipelineCounters {
    accepted: AtomicUsize,
    rejected: AtomicUsize,
    invalid: AtomicUsize,
    enrich_failures: AtomicUsize,
    stored: AtomicUsize,
    duplicates: AtomicUsize,
    store_failures: AtomicUsize,
}

/// Snapshot of pipeline counters, reported at shutdown.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub accepted: usize,
    pub rejected: usize,
    pub invalid: usize,
    pub enrich_failures: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub store_failures: usize,
}

/// The per-event orchestrator.
///
/// Owns the filter and holds shared handles to the scorer and store, both
/// passed in at construction - there is no ambient global state.
pub struct Pipeline {
    filter: EventFilter,
    scorer: Arc<dyn Scorer>,
    store: Arc<RecordStore>,
    limit: Arc<Semaphore>,
    counters: PipelineCounters,
}

impl Pipeline {
    /// Build a pipeline over explicitly owned resources.
    pub fn new(
        filter: EventFilter,
        scorer: Arc<dyn Scorer>,
        store: Arc<RecordStore>,
        config: PipelineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            filter,
            scorer,
            store,
            limit: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            counters: PipelineCounters::default(),
        })
    }

    /// Process one event to its terminal outcome.
    ///
    /// Never returns an error: every per-event fault is logged, counted,
    /// and folded into the outcome.
    pub async fn handle_event(&self, event: RawChangeEvent) -> Outcome {
        if !self.filter.accept(&event) {
            // Rejection is silent by design: no log line, no store write.
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("pipeline_events_rejected_total").increment(1);
            return Outcome::Rejected;
        }

        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pipeline_events_accepted_total").increment(1);

        let Some(revision) = event.revision else {
            self.counters.invalid.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("pipeline_events_invalid_total").increment(1);
            tracing::warn!("Dropping {}: edit event without revision", event.identity());
            return Outcome::Invalid;
        };

        let scores = match self.scorer.score(&event.wiki, revision.new).await {
            Ok(scores) => scores,
            Err(e) => {
                let reason = if e.is_malformed_enrichment() {
                    "malformed"
                } else {
                    "unavailable"
                };
                self.counters.enrich_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("score_failures_total", "reason" => reason).increment(1);
                tracing::warn!("Dropping {}: scoring failed: {}", event.identity(), e);
                return Outcome::EnrichFailed;
            }
        };

        let record = EnrichedChangeRecord::from_event(&event, revision, scores);

        match self.store.insert(&record) {
            Ok(InsertOutcome::Inserted) => {
                self.counters.stored.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("store_inserts_total").increment(1);
                tracing::debug!(
                    "Stored {} (damaging={:.3}, badfaith={:.3})",
                    record.id,
                    record.ores.damaging,
                    record.ores.badfaith
                );
                Outcome::Stored
            }
            Ok(InsertOutcome::Duplicate) => {
                self.counters.duplicates.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("store_duplicates_total").increment(1);
                tracing::warn!("Duplicate key {}", record.id);
                Outcome::Duplicate
            }
            Err(e) => {
                self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("store_failures_total").increment(1);
                tracing::error!("Failed to store {}: {}", record.id, e);
                Outcome::StoreFailed
            }
        }
    }

    /// Consume the event channel until it closes or shutdown is requested.
    ///
    /// Each event runs in its own task under the in-flight cap. In-flight
    /// tasks are drained before returning so a normal channel close loses
    /// nothing; on shutdown the remaining channel contents are abandoned.
    pub async fn run(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<RawChangeEvent>,
        running: Arc<AtomicBool>,
    ) -> PipelineStats {
        let mut tasks: JoinSet<()> = JoinSet::new();

        while running.load(Ordering::SeqCst) {
            // Poll with a timeout so the running flag is rechecked even when
            // the feed is quiet.
            let event = match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => {
                    tracing::info!("Event channel closed");
                    break;
                }
                Err(_) => {
                    while tasks.try_join_next().is_some() {}
                    continue;
                }
            };

            // The semaphore is never closed, so acquire cannot fail.
            let permit = match Arc::clone(&self.limit).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            metrics::gauge!("pipeline_in_flight").increment(1.0);
            let pipeline = Arc::clone(&self);
            tasks.spawn(async move {
                let _permit = permit;
                pipeline.handle_event(event).await;
                metrics::gauge!("pipeline_in_flight").decrement(1.0);
            });

            // Reap whatever has already finished.
            while tasks.try_join_next().is_some() {}
        }

        while tasks.join_next().await.is_some() {}

        self.stats()
    }

    /// Snapshot the pipeline counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            invalid: self.counters.invalid.load(Ordering::Relaxed),
            enrich_failures: self.counters.enrich_failures.load(Ordering::Relaxed),
            stored: self.counters.stored.load(Ordering::Relaxed),
            duplicates: self.counters.duplicates.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use tempfile::TempDir;
    use wikipatrol_core::{ChangeMeta, ChangeType, OresScores, Revision};

    /// Scorer fake: fixed scores per (wiki, rev), configurable failures,
    /// and a call counter to prove rejected events never reach it.
    struct FakeScorer {
        scores: HashMap<(String, i64), OresScores>,
        failing_revs: HashSet<i64>,
        calls: AtomicUsize,
    }

    impl FakeScorer {
        fn new() -> Self {
            let mut scores = HashMap::new();
            scores.insert(
                ("enwiki".to_string(), 11),
                OresScores {
                    damaging: 0.2,
                    badfaith: 0.1,
                },
            );
            scores.insert(
                ("enwiki".to_string(), 13),
                OresScores {
                    damaging: 0.7,
                    badfaith: 0.6,
                },
            );
            Self {
                scores,
                failing_revs: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(mut self, rev: i64) -> Self {
            self.failing_revs.insert(rev);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Scorer for FakeScorer {
        async fn score(&self, wiki: &str, rev_id: i64) -> Result<OresScores> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_revs.contains(&rev_id) {
                return Err(Error::EnrichmentMalformed("missing field".to_string()));
            }
            self.scores
                .get(&(wiki.to_string(), rev_id))
                .copied()
                .ok_or_else(|| Error::EnrichmentMalformed("unknown revision".to_string()))
        }
    }

    fn edit(wiki: &str, id: i64, rev: i64) -> RawChangeEvent {
        RawChangeEvent {
            wiki: wiki.to_string(),
            change_type: ChangeType::Edit,
            id,
            revision: Some(Revision {
                old: Some(rev - 1),
                new: rev,
            }),
            title: "A".to_string(),
            user: "u1".to_string(),
            timestamp: 1000,
            meta: ChangeMeta::default(),
        }
    }

    struct Fixture {
        pipeline: Arc<Pipeline>,
        scorer: Arc<FakeScorer>,
        store: Arc<RecordStore>,
        _tmp: TempDir,
    }

    fn fixture(scorer: FakeScorer) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(RecordStore::open(tmp.path()).unwrap());
        let scorer = Arc::new(scorer);
        let pipeline = Pipeline::new(
            EventFilter::new(["enwiki", "frwiki", "ruwiki"]),
            Arc::clone(&scorer) as Arc<dyn Scorer>,
            Arc::clone(&store),
            PipelineConfig::default(),
        );
        Fixture {
            pipeline,
            scorer,
            store,
            _tmp: tmp,
        }
    }

    #[tokio::test]
    async fn accepted_edit_is_enriched_and_stored() {
        let fx = fixture(FakeScorer::new());

        let outcome = fx.pipeline.handle_event(edit("enwiki", 1, 11)).await;
        assert_eq!(outcome, Outcome::Stored);

        let record = fx.store.get("enwiki-1").unwrap().unwrap();
        assert_eq!(record.ores.damaging, 0.2);
        assert_eq!(record.ores.badfaith, 0.1);
        assert_eq!(record.wiki, "enwiki");
        assert_eq!(record.revision, Revision { old: Some(10), new: 11 });
        assert_eq!(fx.scorer.calls(), 1);
    }

    #[tokio::test]
    async fn duplicate_delivery_keeps_one_record() {
        let fx = fixture(FakeScorer::new());

        assert_eq!(
            fx.pipeline.handle_event(edit("enwiki", 1, 11)).await,
            Outcome::Stored
        );
        assert_eq!(
            fx.pipeline.handle_event(edit("enwiki", 1, 11)).await,
            Outcome::Duplicate
        );

        let record = fx.store.get("enwiki-1").unwrap().unwrap();
        assert_eq!(record.ores.damaging, 0.2);

        let stats = fx.pipeline.stats();
        assert_eq!(stats.stored, 1);
        assert_eq!(stats.duplicates, 1);
    }

    #[tokio::test]
    async fn non_allowlisted_wiki_is_rejected_without_side_effects() {
        let fx = fixture(FakeScorer::new());

        let outcome = fx.pipeline.handle_event(edit("dewiki", 2, 21)).await;
        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(fx.scorer.calls(), 0, "no scoring call for rejected events");
        assert!(fx.store.get("dewiki-2").unwrap().is_none());
    }

    #[tokio::test]
    async fn non_edit_type_is_rejected() {
        let fx = fixture(FakeScorer::new());

        let mut event = edit("enwiki", 3, 31);
        event.change_type = ChangeType::Log;

        assert_eq!(fx.pipeline.handle_event(event).await, Outcome::Rejected);
        assert_eq!(fx.scorer.calls(), 0);
        assert!(fx.store.get("enwiki-3").unwrap().is_none());
    }

    #[tokio::test]
    async fn enrich_failure_does_not_block_later_events() {
        let fx = fixture(FakeScorer::new().failing(11));

        assert_eq!(
            fx.pipeline.handle_event(edit("enwiki", 1, 11)).await,
            Outcome::EnrichFailed
        );
        assert_eq!(
            fx.pipeline.handle_event(edit("enwiki", 2, 13)).await,
            Outcome::Stored
        );

        assert!(fx.store.get("enwiki-1").unwrap().is_none());
        assert!(fx.store.get("enwiki-2").unwrap().is_some());
    }

    #[tokio::test]
    async fn edit_without_revision_is_invalid() {
        let fx = fixture(FakeScorer::new());

        let mut event = edit("enwiki", 4, 41);
        event.revision = None;

        assert_eq!(fx.pipeline.handle_event(event).await, Outcome::Invalid);
        assert_eq!(fx.scorer.calls(), 0);
    }

    #[tokio::test]
    async fn run_drains_channel_and_reports_stats() {
        let fx = fixture(FakeScorer::new());
        let (tx, rx) = mpsc::channel(16);
        let running = Arc::new(AtomicBool::new(true));

        tx.send(edit("enwiki", 1, 11)).await.unwrap();
        tx.send(edit("enwiki", 2, 13)).await.unwrap();
        tx.send(edit("dewiki", 3, 15)).await.unwrap();
        drop(tx);

        let stats = Arc::clone(&fx.pipeline).run(rx, running).await;

        assert_eq!(stats.stored, 2);
        assert_eq!(stats.rejected, 1);
        assert!(fx.store.get("enwiki-1").unwrap().is_some());
        assert!(fx.store.get("enwiki-2").unwrap().is_some());
    }
}
