use super::identity::{authoritative_key, content_key};
use super::models::CanonicalEvent;
use std::collections::HashMap;

/// State of an event the user asked to add to their calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddState {
    /// Shown as added while the write is in flight
    Pending,
    Added,
}

/// Which events were already added, keyed by authoritative key
#[derive(Debug, Clone, Default)]
pub struct AddedLedger {
    entries: HashMap<String, AddState>,
}

impl AddedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_pending(&mut self, event: &CanonicalEvent) {
        self.entries.insert(authoritative_key(event), AddState::Pending);
    }

    pub fn mark_added(&mut self, event: &CanonicalEvent) {
        self.entries.insert(authoritative_key(event), AddState::Added);
    }

    /// Roll back an optimistic mark after a failed write
    pub fn mark_failed(&mut self, event: &CanonicalEvent) {
        self.entries.remove(&authoritative_key(event));
    }

    /// Pending counts as added so the same event cannot be submitted twice
    pub fn is_added(&self, event: &CanonicalEvent) -> bool {
        self.entries.contains_key(&authoritative_key(event))
    }

    pub fn state(&self, event: &CanonicalEvent) -> Option<AddState> {
        self.entries.get(&authoritative_key(event)).copied()
    }

    /// Drop the event under its id and under its content key, which is
    /// where it was recorded before it had an id
    pub fn forget(&mut self, event: &CanonicalEvent) {
        self.entries.remove(&authoritative_key(event));
        self.entries.remove(&content_key(event));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
