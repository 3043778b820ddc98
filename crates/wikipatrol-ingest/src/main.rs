//! wikipatrol live ingestion daemon.
//!
//! Subscribes to the Wikimedia recent-change stream, filters to edits from
//! the configured wikis, enriches each with ORES damaging/goodfaith scores,
//! and persists one record per change identity.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (enwiki/frwiki/ruwiki, store under ./data)
//! wikipatrol-ingest
//!
//! # Custom store location and allow-list
//! wikipatrol-ingest \
//!     --store-path /var/lib/wikipatrol \
//!     --store-namespace recentchanges \
//!     --wikis enwiki,eswiki
//! ```
//!
//! # Graceful shutdown
//!
//! SIGINT/SIGTERM flip the running flag: the feed stops, in-flight events
//! are drained, the store is flushed, and a summary is logged. Events still
//! buffered in the channel at that point are abandoned; at-least-once feed
//! delivery makes that loss acceptable.

use anyhow::{Context, Result};
use clap::Parser;
use metrics::gauge;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wikipatrol_core::metrics::{init_metrics, start_metrics_server};
use wikipatrol_ingest::{
    EventFilter, FeedConfig, FeedSource, OresClient, OresConfig, Pipeline, PipelineConfig,
    RecordStore, Scorer, DEFAULT_FEED_URL, DEFAULT_ORES_URL,
};

/// wikipatrol live ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "wikipatrol-ingest")]
#[command(about = "Live recent-change ingestion daemon with ORES enrichment")]
#[command(version)]
struct Args {
    /// Recent-change stream URL
    #[arg(long, env = "WIKIPATROL_FEED_URL", default_value = DEFAULT_FEED_URL)]
    feed_url: String,

    /// Store endpoint: directory holding the record store
    #[arg(long, env = "WIKIPATROL_STORE_PATH", default_value = "./data")]
    store_path: PathBuf,

    /// Logical namespace within the store endpoint
    #[arg(long, env = "WIKIPATROL_STORE_NAMESPACE", default_value = "recentchanges")]
    store_namespace: String,

    /// ORES scoring host
    #[arg(long, env = "WIKIPATROL_ORES_URL", default_value = DEFAULT_ORES_URL)]
    ores_url: String,

    /// Wikis to track (comma-separated allow-list)
    #[arg(long, value_delimiter = ',', default_value = "enwiki,frwiki,ruwiki")]
    wikis: Vec<String>,

    /// Maximum events enriched/stored concurrently
    #[arg(long, default_value = "64")]
    max_in_flight: usize,

    /// Timeout for a single ORES request, in seconds
    #[arg(long, default_value = "10")]
    score_timeout_secs: u64,

    /// Size of the feed-to-pipeline channel buffer
    #[arg(long, default_value = "1024")]
    channel_size: usize,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required when both ring and aws-lc-rs
    // are present in the dependency graph).
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap())
                .add_directive("wikipatrol_ingest=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    tracing::info!("wikipatrol ingestion daemon starting...");

    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle)
            .await
            .context("Failed to start metrics server")?;
        gauge!("ingest_running").set(1.0);
    }

    // Set up graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    tracing::info!("Configuration:");
    tracing::info!("  Feed:      {}", args.feed_url);
    tracing::info!(
        "  Store:     {} (namespace {})",
        args.store_path.display(),
        args.store_namespace
    );
    tracing::info!("  ORES:      {}", args.ores_url);
    tracing::info!("  Wikis:     {}", args.wikis.join(","));
    tracing::info!("  In-flight: {}", args.max_in_flight);

    // A store we cannot open is the one fatal setup error.
    let store_path = args.store_path.join(&args.store_namespace);
    let store = Arc::new(
        RecordStore::open(&store_path)
            .with_context(|| format!("Failed to open record store at {:?}", store_path))?,
    );
    let store_stats = store.stats();
    tracing::info!(
        "Record store opened: ~{} records",
        store_stats.approximate_records
    );
    gauge!("store_records_approximate").set(store_stats.approximate_records as f64);

    let scorer: Arc<dyn Scorer> = Arc::new(
        OresClient::new(OresConfig {
            base_url: args.ores_url.clone(),
            timeout: Duration::from_secs(args.score_timeout_secs),
        })
        .context("Failed to build ORES client")?,
    );

    let filter = EventFilter::new(args.wikis.iter().cloned());
    if filter.is_empty() {
        anyhow::bail!("allow-list is empty: no wiki would ever be ingested");
    }

    let pipeline = Pipeline::new(
        filter,
        scorer,
        Arc::clone(&store),
        PipelineConfig {
            max_in_flight: args.max_in_flight,
        },
    );

    // Feed task: a dedicated listener pushing decoded events into the
    // channel the pipeline consumes.
    let (tx, rx) = tokio::sync::mpsc::channel(args.channel_size.max(1));
    let feed = FeedSource::new(
        FeedConfig {
            url: args.feed_url.clone(),
        },
        Arc::clone(&running),
    );
    let feed_handle = tokio::spawn(async move { feed.run(tx).await });

    tracing::info!("Starting live ingestion...");
    let stats = Arc::clone(&pipeline).run(rx, Arc::clone(&running)).await;

    // Shutdown sequence
    tracing::info!("Shutting down...");

    let feed_stats = feed_handle
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("Feed task panicked: {:?}", e);
            Default::default()
        });

    store.flush().context("Failed to flush record store")?;
    gauge!("ingest_running").set(0.0);

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Feed messages received:  {}", feed_stats.received);
    tracing::info!("Feed decode errors:      {}", feed_stats.decode_errors);
    tracing::info!("Feed transport errors:   {}", feed_stats.transport_errors);
    tracing::info!("Events accepted:         {}", stats.accepted);
    tracing::info!("Events rejected:         {}", stats.rejected);
    tracing::info!("Records stored:          {}", stats.stored);
    tracing::info!("Duplicates ignored:      {}", stats.duplicates);
    tracing::info!("Enrichment failures:     {}", stats.enrich_failures);
    tracing::info!("Store failures:          {}", stats.store_failures);
    tracing::info!(
        "Records in store:        ~{}",
        store.approximate_count().unwrap_or(0)
    );

    Ok(())
}
