use super::models::{
    AttendingParent, CanonicalEvent, ChildRef, EventCategory, EventSource, ExtraDetails, RawEvent,
    UNTITLED_EVENT,
};
use super::time::{now_in, parse_timestamp};
use chrono::{DateTime, Duration, FixedOffset};
use chrono_tz::Tz;
use tracing::{debug, warn};

/// Settings shared by every normalization in one aggregation pass
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Zone used for naive and date-only timestamps
    pub tz: Tz,
    /// Fixed "now" for the inferred-date fallback; the clock is read when unset
    pub now: Option<DateTime<FixedOffset>>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::new(chrono_tz::UTC)
    }
}

impl NormalizeOptions {
    pub fn new(tz: Tz) -> Self {
        Self { tz, now: None }
    }

    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    fn now(&self) -> DateTime<FixedOffset> {
        self.now.unwrap_or_else(|| now_in(&self.tz))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Convert a raw record into a canonical event. Never fails.
pub fn normalize(raw: &RawEvent, source: EventSource, opts: &NormalizeOptions) -> CanonicalEvent {
    let (start_at, inferred_date) = resolve_start(raw, opts);
    let end_at = resolve_end(raw, start_at, opts);

    let title = non_blank(&raw.title).or_else(|| non_blank(&raw.summary));
    let summary = non_blank(&raw.summary).or(title);
    let title = title.unwrap_or(UNTITLED_EVENT).to_string();
    let summary = summary.unwrap_or(UNTITLED_EVENT).to_string();

    let category = non_blank(&raw.category)
        .or_else(|| non_blank(&raw.event_type))
        .map(EventCategory::from_label)
        .unwrap_or_default();
    let event_type = non_blank(&raw.event_type)
        .or_else(|| non_blank(&raw.category))
        .map(EventCategory::from_label)
        .unwrap_or_default();

    let child_id = non_blank(&raw.child_id).map(str::to_string);
    let child_name = non_blank(&raw.child_name).map(str::to_string);
    let child = if child_id.is_some() || child_name.is_some() {
        Some(ChildRef {
            id: child_id,
            name: child_name,
        })
    } else {
        None
    };

    let record_source = non_blank(&raw.source).and_then(EventSource::from_label);
    let event_source = record_source.unwrap_or(source);

    let event = CanonicalEvent {
        internal_id: non_blank(&raw.internal_id).map(str::to_string),
        external_id: non_blank(&raw.id).map(str::to_string),
        linked_entity: raw.linked_entity.clone(),
        title,
        summary,
        description: raw.description.clone().unwrap_or_default(),
        location: raw.location.clone().unwrap_or_default(),
        start_at,
        end_at,
        inferred_date,
        category,
        event_type,
        child,
        sibling_ids: raw.sibling_ids.clone(),
        sibling_names: raw.sibling_names.clone(),
        attending_parent: AttendingParent::from_raw(raw.attending_parent_id.as_deref()),
        host_parent_name: non_blank(&raw.host_parent_name).map(str::to_string),
        assigned_to: non_blank(&raw.assigned_to).map(str::to_string),
        assigned_to_name: non_blank(&raw.assigned_to_name).map(str::to_string),
        attendees: Vec::new(),
        source: event_source,
        extra_details: merge_extra_details(raw, event_source),
    };

    debug!(
        "Normalized \"{}\" from {} starting {}",
        event.title, event.source, event.start_at
    );

    event
}

fn resolve_start(raw: &RawEvent, opts: &NormalizeOptions) -> (DateTime<FixedOffset>, bool) {
    let start = raw.start.as_ref();
    let candidates = [
        start.and_then(|s| s.date_time.as_deref()),
        start.and_then(|s| s.date.as_deref()),
        raw.date_time.as_deref(),
        raw.date.as_deref(),
    ];

    match candidates
        .into_iter()
        .flatten()
        .find_map(|value| parse_timestamp(value, &opts.tz))
    {
        Some(start_at) => (start_at, false),
        None => {
            warn!(
                "No usable start date on \"{}\", using the current time",
                raw.title.as_deref().or(raw.summary.as_deref()).unwrap_or(UNTITLED_EVENT)
            );
            (opts.now(), true)
        }
    }
}

fn resolve_end(
    raw: &RawEvent,
    start_at: DateTime<FixedOffset>,
    opts: &NormalizeOptions,
) -> DateTime<FixedOffset> {
    let end = raw.end.as_ref();
    let candidates = [
        end.and_then(|e| e.date_time.as_deref()),
        end.and_then(|e| e.date.as_deref()),
        raw.end_date_time.as_deref(),
    ];

    candidates
        .into_iter()
        .flatten()
        .find_map(|value| parse_timestamp(value, &opts.tz))
        .filter(|end_at| *end_at >= start_at)
        .unwrap_or_else(|| start_at + Duration::hours(1))
}

/// Fold the legacy spellings of the AI metadata into one shape. Nested values win.
fn merge_extra_details(raw: &RawEvent, event_source: EventSource) -> ExtraDetails {
    let nested = raw.extra_details.clone().unwrap_or_default();

    let creation_source = nested
        .creation_source
        .as_deref()
        .and_then(EventSource::from_label)
        .unwrap_or(event_source);

    ExtraDetails {
        parsed_with_ai: nested.parsed_with_ai.or(raw.parsed_with_ai).unwrap_or(false),
        extraction_confidence: nested
            .extraction_confidence
            .or(raw.extraction_confidence)
            .filter(|c| c.is_finite()),
        parsed_from_image: nested
            .parsed_from_image
            .or(raw.parsed_from_image)
            .unwrap_or(false),
        creation_source,
    }
}
