//! Core types and shared utilities for the wikipatrol ingestion pipeline.
//!
//! This crate provides:
//! - The recent-change event model (raw feed events and enriched records)
//! - The composite record identity used as the store's unique key
//! - Prometheus metrics helpers

pub mod event;
pub mod metrics;

pub use event::{
    ChangeMeta, ChangeType, EnrichedChangeRecord, OresScores, RawChangeEvent, Revision,
};
