use super::actor::{CalendarSources, CalendarSyncActor, CalendarSyncActorHandle, RefreshTrigger};
use super::conflicts::Availability;
use super::filters::{CalendarView, MemberSelector};
use super::ledger::AddState;
use super::models::{AddEventOutcome, CanonicalEvent, EventPatch, RawEvent};
use crate::config::Config;
use crate::error::CalendarResult;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Handle for interacting with the calendar sync actor
#[derive(Clone)]
pub struct CalendarSyncHandle {
    actor_handle: CalendarSyncActorHandle,
    _actor_task: Arc<JoinHandle<()>>,
}

impl CalendarSyncHandle {
    /// Create a new CalendarSyncHandle and spawn the actor
    pub fn new(config: Arc<RwLock<Config>>, sources: CalendarSources) -> Self {
        let (mut actor, handle) = CalendarSyncActor::new(config, sources);

        let actor_task = tokio::spawn(async move {
            actor.run().await;
        });

        Self {
            actor_handle: handle,
            _actor_task: Arc::new(actor_task),
        }
    }

    /// Reload every source and return the merged timeline
    pub async fn refresh(&self, trigger: RefreshTrigger) -> CalendarResult<Vec<CanonicalEvent>> {
        self.actor_handle.refresh(trigger).await
    }

    /// Timeline accepted by the last refresh
    pub async fn events(&self) -> CalendarResult<Vec<CanonicalEvent>> {
        self.actor_handle.events().await
    }

    pub async fn upcoming(
        &self,
        view: CalendarView,
        selector: MemberSelector,
    ) -> CalendarResult<Vec<CanonicalEvent>> {
        self.actor_handle.upcoming(view, selector).await
    }

    /// Events clashing with `event`
    pub async fn conflicts_for(&self, event: CanonicalEvent) -> CalendarResult<Vec<CanonicalEvent>> {
        self.actor_handle.conflicts_for(event).await
    }

    /// Who in the family is free at the time of `event`
    pub async fn availability_for(
        &self,
        event: CanonicalEvent,
    ) -> CalendarResult<BTreeMap<String, Availability>> {
        self.actor_handle.availability_for(event).await
    }

    pub async fn add_event(&self, event: RawEvent) -> CalendarResult<AddEventOutcome> {
        self.actor_handle.add_event(event).await
    }

    pub async fn update_event(&self, id: &str, patch: EventPatch) -> CalendarResult<bool> {
        self.actor_handle.update_event(id, patch).await
    }

    pub async fn delete_event(&self, id: &str) -> CalendarResult<bool> {
        self.actor_handle.delete_event(id).await
    }

    pub async fn is_added(&self, event: CanonicalEvent) -> CalendarResult<bool> {
        self.actor_handle.is_added(event).await
    }

    /// Pending while the write is in flight, then added
    pub async fn add_state(&self, event: CanonicalEvent) -> CalendarResult<Option<AddState>> {
        self.actor_handle.add_state(event).await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> CalendarResult<()> {
        self.actor_handle.shutdown().await
    }
}
