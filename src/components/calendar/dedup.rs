use super::identity::signature;
use super::models::CanonicalEvent;
use std::collections::HashSet;

/// Signatures seen during one aggregation session.
///
/// There is no eviction; callers `reset` before a full reload so deleted
/// events do not leave stale markers behind.
#[derive(Debug, Clone, Default)]
pub struct DedupCache {
    seen: HashSet<String>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every signature
    pub fn reset(&mut self) {
        self.seen.clear();
    }

    /// True if an event with the same signature was already marked
    pub fn exists(&self, event: &CanonicalEvent) -> bool {
        self.seen.contains(&signature(event))
    }

    /// Record the event's signature. Returns false if it was already present.
    pub fn mark_seen(&mut self, event: &CanonicalEvent) -> bool {
        self.seen.insert(signature(event))
    }

    /// Drop one signature, e.g. right after the event was deleted
    pub fn forget(&mut self, event: &CanonicalEvent) -> bool {
        self.seen.remove(&signature(event))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
