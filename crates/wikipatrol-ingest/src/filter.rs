//! Event filter: edits from allow-listed wikis only.
//!
//! A pure predicate with no side effects. Rejected events terminate
//! processing for that event silently; no log line, no store write.

use std::collections::HashSet;
use wikipatrol_core::{ChangeType, RawChangeEvent};

/// Predicate over decoded feed events.
///
/// Accepts exactly the events the pipeline should enrich and persist:
/// `type == edit` and the source wiki is in the allow-list.
#[derive(Debug, Clone)]
pub struct EventFilter {
    allowed_wikis: HashSet<String>,
}

impl EventFilter {
    /// Build a filter from the configured allow-list.
    pub fn new<I, S>(wikis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_wikis: wikis.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this event should be enriched and stored.
    pub fn accept(&self, event: &RawChangeEvent) -> bool {
        event.change_type == ChangeType::Edit && self.allowed_wikis.contains(&event.wiki)
    }

    /// The configured allow-list size (used in startup logging).
    pub fn len(&self) -> usize {
        self.allowed_wikis.len()
    }

    /// Whether the allow-list is empty (a misconfiguration: nothing would
    /// ever be ingested).
    pub fn is_empty(&self) -> bool {
        self.allowed_wikis.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikipatrol_core::{ChangeMeta, Revision};

    fn event(wiki: &str, change_type: ChangeType) -> RawChangeEvent {
        RawChangeEvent {
            wiki: wiki.to_string(),
            change_type,
            id: 1,
            revision: Some(Revision { old: Some(10), new: 11 }),
            title: "A".to_string(),
            user: "u1".to_string(),
            timestamp: 1000,
            meta: ChangeMeta::default(),
        }
    }

    fn filter() -> EventFilter {
        EventFilter::new(["enwiki", "frwiki", "ruwiki"])
    }

    #[test]
    fn accepts_edit_from_allowed_wiki() {
        assert!(filter().accept(&event("enwiki", ChangeType::Edit)));
        assert!(filter().accept(&event("ruwiki", ChangeType::Edit)));
    }

    #[test]
    fn rejects_edit_from_other_wiki() {
        assert!(!filter().accept(&event("dewiki", ChangeType::Edit)));
    }

    #[test]
    fn rejects_non_edit_types() {
        assert!(!filter().accept(&event("enwiki", ChangeType::New)));
        assert!(!filter().accept(&event("enwiki", ChangeType::Log)));
        assert!(!filter().accept(&event("enwiki", ChangeType::Categorize)));
        assert!(!filter().accept(&event("enwiki", ChangeType::Other)));
    }

    #[test]
    fn empty_allow_list_rejects_everything() {
        let f = EventFilter::new(Vec::<String>::new());
        assert!(f.is_empty());
        assert!(!f.accept(&event("enwiki", ChangeType::Edit)));
    }
}
