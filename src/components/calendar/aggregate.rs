use super::attendees::resolve_all;
use super::dedup::DedupCache;
use super::models::{CanonicalEvent, EventSource, FamilyMember, RawEvent};
use super::normalize::{normalize, NormalizeOptions};
use crate::error::{CalendarResult, Error};
use tracing::{debug, info, warn};

/// Merge order of the sources. Lower variants win when two sources
/// produce the same signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourcePriority {
    Provider,
    SystemMeeting,
    TaskDueDate,
    UserAuthored,
}

/// One source's contribution to an aggregation pass
#[derive(Debug)]
pub struct SourceBatch {
    pub name: String,
    pub priority: SourcePriority,
    pub source: EventSource,
    pub outcome: CalendarResult<Vec<RawEvent>>,
}

impl SourceBatch {
    pub fn new(
        name: impl Into<String>,
        priority: SourcePriority,
        source: EventSource,
        outcome: CalendarResult<Vec<RawEvent>>,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            source,
            outcome,
        }
    }

    pub fn ok(
        name: impl Into<String>,
        priority: SourcePriority,
        source: EventSource,
        events: Vec<RawEvent>,
    ) -> Self {
        Self::new(name, priority, source, Ok(events))
    }

    pub fn failed(
        name: impl Into<String>,
        priority: SourcePriority,
        source: EventSource,
        error: Error,
    ) -> Self {
        Self::new(name, priority, source, Err(error))
    }
}

/// Normalize one batch, keeping the first event of each signature
fn normalize_batch(batch: SourceBatch, opts: &NormalizeOptions) -> Vec<CanonicalEvent> {
    let raws = match batch.outcome {
        Ok(raws) => raws,
        Err(e) => {
            warn!("Source {} failed, treating it as empty: {}", batch.name, e);
            return Vec::new();
        }
    };

    let mut local = DedupCache::new();
    let events: Vec<CanonicalEvent> = raws
        .iter()
        .map(|raw| normalize(raw, batch.source, opts))
        .filter(|event| local.mark_seen(event))
        .collect();

    debug!(
        "Source {} yielded {} events ({} duplicates dropped)",
        batch.name,
        events.len(),
        raws.len() - events.len()
    );

    events
}

/// Merge every source into one timeline with at most one event per signature.
///
/// Batches are merged in `SourcePriority` order, stable among equals. An event
/// whose signature is already in `cache` is skipped, so events accepted in an
/// earlier pass of the same session are not emitted again.
pub fn aggregate(
    mut batches: Vec<SourceBatch>,
    cache: &mut DedupCache,
    directory: &[FamilyMember],
    opts: &NormalizeOptions,
) -> Vec<CanonicalEvent> {
    batches.sort_by_key(|batch| batch.priority);

    let mut merged = Vec::new();
    let mut skipped = 0usize;

    for batch in batches {
        for event in normalize_batch(batch, opts) {
            if cache.mark_seen(&event) {
                merged.push(event);
            } else {
                skipped += 1;
            }
        }
    }

    resolve_all(&mut merged, directory);

    info!(
        "Aggregated {} events ({} already seen this session)",
        merged.len(),
        skipped
    );

    merged
}
