//! Recent-change event model.
//!
//! Two shapes live here:
//! - [`RawChangeEvent`] - what the Wikimedia EventStreams feed delivers.
//!   Transient; decoded per message and never persisted as-is.
//! - [`EnrichedChangeRecord`] - the stored document: an accepted edit plus
//!   its ORES scores, keyed by the composite identity `"<wiki>-<changeId>"`.
//!
//! The feed carries many more fields than we model; unknown fields are
//! ignored during deserialization.

use serde::{Deserialize, Serialize};

/// The change type reported by the feed.
///
/// Only `edit` is ingested; the rest exist so decoding stays total. Types
/// the feed may grow in the future map to [`ChangeType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// A content revision to an existing page.
    Edit,
    /// A page creation.
    New,
    /// A log action (deletion, protection, ...).
    Log,
    /// A categorization change.
    Categorize,
    /// Any change type we do not recognize.
    #[serde(other)]
    Other,
}

/// Old/new revision identifiers attached to an edit.
///
/// `old` is absent for page creations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(default)]
    pub old: Option<i64>,
    pub new: i64,
}

/// Feed message metadata. Only `uri` is modeled; it is diagnostic-only and
/// never persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeMeta {
    #[serde(default)]
    pub uri: Option<String>,
}

/// A raw recent-change event as decoded from the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct RawChangeEvent {
    /// Source wiki identifier, e.g. `enwiki`.
    pub wiki: String,

    /// The change type (`type` on the wire).
    #[serde(rename = "type")]
    pub change_type: ChangeType,

    /// Numeric recent-change id, unique per wiki.
    pub id: i64,

    /// Revision descriptor. Present for edits; absent for most log events.
    #[serde(default)]
    pub revision: Option<Revision>,

    /// Page title.
    #[serde(default)]
    pub title: String,

    /// Editing user (name or IP).
    #[serde(default)]
    pub user: String,

    /// Event time, epoch seconds.
    pub timestamp: i64,

    /// Feed metadata, not persisted.
    #[serde(default)]
    pub meta: ChangeMeta,
}

impl RawChangeEvent {
    /// Composite identity for this change: `"<wiki>-<changeId>"`.
    ///
    /// Deterministic and unique per `(wiki, id)` pair; computed here, never
    /// by the store.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.wiki, self.id)
    }
}

/// ORES model outputs for a single revision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OresScores {
    /// `damaging` model: probability the edit is damaging, in [0, 1].
    pub damaging: f64,

    /// `goodfaith` model: probability the edit was made in *bad* faith
    /// (the model's `probability.false`), in [0, 1].
    pub badfaith: f64,
}

/// A persisted, enriched recent-change record.
///
/// Created once per accepted event and never mutated. The store owns
/// persisted instances; the pipeline only holds one in flight until its
/// insert returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedChangeRecord {
    /// Unique key: `"<wiki>-<changeId>"`.
    pub id: String,

    /// Numeric recent-change id.
    pub change_id: i64,

    /// Old/new revision identifiers.
    pub revision: Revision,

    /// Page title.
    pub title: String,

    /// Editing user.
    pub user: String,

    /// Source wiki identifier.
    pub wiki: String,

    /// Event time, epoch seconds.
    pub timestamp: i64,

    /// Enrichment scores.
    pub ores: OresScores,
}

impl EnrichedChangeRecord {
    /// Build a record from an accepted edit and its scores.
    ///
    /// The revision is passed separately because it is optional on the raw
    /// event; callers must have already established it is present.
    pub fn from_event(event: &RawChangeEvent, revision: Revision, ores: OresScores) -> Self {
        Self {
            id: event.identity(),
            change_id: event.id,
            revision,
            title: event.title.clone(),
            user: event.user.clone(),
            wiki: event.wiki.clone(),
            timestamp: event.timestamp,
            ores,
        }
    }
}
