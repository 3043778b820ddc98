//! wikipatrol ingestion pipeline components.
//!
//! This crate provides the live pipeline that turns the Wikimedia
//! recent-change stream into durably stored, ORES-enriched edit records.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   FeedSource    │  SSE subscription, decode, auto-reconnect
//! └────────┬────────┘
//!          │ bounded mpsc channel
//!          ▼
//! ┌─────────────────┐
//! │    Pipeline     │  per-event task: filter → score → insert
//! └───┬────────┬────┘
//!     │        │
//!     ▼        ▼
//! ┌────────┐ ┌─────────────┐
//! │ Scorer │ │ RecordStore │  ORES HTTP call / RocksDB keyed documents
//! └────────┘ └─────────────┘
//! ```
//!
//! Events flow one-directional; nothing holds cross-event state except the
//! store. Each event is isolated: its failure is logged and the stream
//! moves on.

pub mod error;
pub mod feed;
pub mod filter;
pub mod pipeline;
pub mod score;
pub mod store;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use feed::{FeedConfig, FeedSource, FeedStats, DEFAULT_FEED_URL};
pub use filter::EventFilter;
pub use pipeline::{Outcome, Pipeline, PipelineConfig, PipelineStats};
pub use score::{OresClient, OresConfig, Scorer, DEFAULT_ORES_URL};
pub use store::{InsertOutcome, RecordStore, StoreStats};
