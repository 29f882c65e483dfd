use super::identity::signature;
use super::models::{
    AddEventOutcome, AttendingParent, CanonicalEvent, EventPatch, EventSource, RawEvent,
    RawEventTime,
};
use super::normalize::{normalize, NormalizeOptions};
use super::provider::{EventProvider, EventRepository};
use crate::error::CalendarResult;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// User-authored events kept in memory.
///
/// Records are stored raw and normalized on every read, so an update that
/// breaks `start <= end` is repaired the same way a fresh record would be.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<RawEvent>>,
    opts: NormalizeOptions,
}

fn time_block(dt: DateTime<FixedOffset>) -> RawEventTime {
    RawEventTime {
        date_time: Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        date: None,
    }
}

fn attending_parent_label(parent: AttendingParent) -> Option<String> {
    match parent {
        AttendingParent::None => None,
        AttendingParent::Specific(id) => Some(id),
        AttendingParent::Both => Some("both".to_string()),
        AttendingParent::Undecided => Some("undecided".to_string()),
    }
}

fn apply_patch(raw: &mut RawEvent, patch: EventPatch) {
    if let Some(title) = patch.title {
        raw.summary = Some(title.clone());
        raw.title = Some(title);
    }
    if let Some(description) = patch.description {
        raw.description = Some(description);
    }
    if let Some(location) = patch.location {
        raw.location = Some(location);
    }
    if let Some(start_at) = patch.start_at {
        raw.start = Some(time_block(start_at));
    }
    if let Some(end_at) = patch.end_at {
        raw.end = Some(time_block(end_at));
    }
    if let Some(category) = patch.category {
        raw.event_type = Some(category.to_string());
        raw.category = Some(category.into());
    }
    if let Some(child) = patch.child {
        raw.child_id = child.id;
        raw.child_name = child.name;
    }
    if let Some(parent) = patch.attending_parent {
        raw.attending_parent_id = attending_parent_label(parent);
    }
    if let Some(host) = patch.host_parent_name {
        raw.host_parent_name = Some(host);
    }
}

impl InMemoryEventStore {
    pub fn new(opts: NormalizeOptions) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            opts,
        }
    }

    fn canonical(&self, raw: &RawEvent) -> CanonicalEvent {
        normalize(raw, EventSource::Manual, &self.opts)
    }

    /// Normalized view of a stored event
    pub async fn get(&self, id: &str) -> Option<CanonicalEvent> {
        let events = self.events.read().await;
        events
            .iter()
            .find(|raw| raw.internal_id.as_deref() == Some(id))
            .map(|raw| self.canonical(raw))
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventStore {
    async fn add_event(&self, event: RawEvent) -> CalendarResult<AddEventOutcome> {
        let candidate = signature(&self.canonical(&event));
        let mut events = self.events.write().await;

        if let Some(existing) = events
            .iter()
            .find(|raw| signature(&self.canonical(raw)) == candidate)
        {
            info!("Duplicate event detected: {}", candidate);
            return Ok(AddEventOutcome {
                success: true,
                event_id: existing.internal_id.clone(),
                is_mock: false,
                is_duplicate: true,
            });
        }

        let id = Uuid::new_v4().to_string();
        let mut stored = event;
        stored.internal_id = Some(id.clone());
        events.push(stored);

        info!("Stored event {} ({})", id, candidate);

        Ok(AddEventOutcome {
            success: true,
            event_id: Some(id),
            is_mock: false,
            is_duplicate: false,
        })
    }

    async fn delete_event(&self, id: &str) -> CalendarResult<bool> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|raw| raw.internal_id.as_deref() != Some(id));

        let removed = events.len() < before;
        if removed {
            info!("Deleted event {}", id);
        } else {
            warn!("Delete requested for unknown event {}", id);
        }
        Ok(removed)
    }

    async fn update_event(&self, id: &str, patch: EventPatch) -> CalendarResult<bool> {
        let mut events = self.events.write().await;
        let Some(raw) = events
            .iter_mut()
            .find(|raw| raw.internal_id.as_deref() == Some(id))
        else {
            warn!("Update requested for unknown event {}", id);
            return Ok(false);
        };

        apply_patch(raw, patch);
        let updated = normalize(raw, EventSource::Manual, &self.opts);
        debug!(
            "Updated event {}: {} at {}",
            id, updated.title, updated.start_at
        );
        Ok(true)
    }
}

#[async_trait]
impl EventProvider for InMemoryEventStore {
    async fn fetch_events(
        &self,
        principal_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CalendarResult<Vec<RawEvent>> {
        let events = self.events.read().await;
        let selected: Vec<RawEvent> = events
            .iter()
            .filter(|raw| {
                let day = self.canonical(raw).calendar_day();
                start <= day && day <= end
            })
            .cloned()
            .collect();

        debug!(
            "Store returned {} of {} events for {}",
            selected.len(),
            events.len(),
            principal_id
        );
        Ok(selected)
    }
}
