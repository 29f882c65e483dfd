mod actor;
pub mod aggregate;
pub mod attendees;
pub mod conflicts;
pub mod dedup;
pub mod filters;
mod handle;
pub mod identity;
pub mod ledger;
pub mod models;
pub mod normalize;
pub mod provider;
mod scheduler;
pub mod store;
pub mod synthesized;
pub mod time;

pub use actor::{CalendarSources, ProviderSource, RefreshTrigger};
pub use handle::CalendarSyncHandle;
pub use models::{CanonicalEvent, RawEvent};

use crate::config::Config;
use crate::error::{component_error, CalendarResult};
use async_trait::async_trait;
use models::EventSource;
use normalize::NormalizeOptions;
use provider::{JsonFileDirectory, JsonFileProvider, JsonFileTasks};
use std::path::Path;
use std::sync::Arc;
use store::InMemoryEventStore;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info};

use scheduler::start_scheduler;

/// Keeps the merged family timeline fresh
#[derive(Default)]
pub struct CalendarSync {
    sources: RwLock<Option<CalendarSources>>,
    handle: RwLock<Option<CalendarSyncHandle>>,
    scheduler: RwLock<Option<JoinHandle<()>>>,
}

impl CalendarSync {
    /// Sources are read from the data directory at init
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given collaborators instead of the data directory
    pub fn with_sources(sources: CalendarSources) -> Self {
        Self {
            sources: RwLock::new(Some(sources)),
            ..Self::default()
        }
    }

    /// Get the handle if it exists
    pub async fn get_handle(&self) -> Option<CalendarSyncHandle> {
        let handle_lock = self.handle.read().await;
        handle_lock.clone()
    }

    fn file_sources(config: &Config) -> CalendarResult<CalendarSources> {
        let data_dir = Path::new(&config.data_dir);
        let store = Arc::new(InMemoryEventStore::new(NormalizeOptions::new(config.tz()?)));

        Ok(CalendarSources::with_store(
            vec![ProviderSource::new(
                "google",
                EventSource::Google,
                Arc::new(JsonFileProvider::new(data_dir.join("events.json"))),
            )],
            store,
            Arc::new(JsonFileDirectory::new(data_dir.join("members.json"))),
            Arc::new(JsonFileTasks::new(data_dir.join("tasks.json"))),
        ))
    }
}

#[async_trait]
impl super::Component for CalendarSync {
    fn name(&self) -> &'static str {
        "calendar_sync"
    }

    async fn init(&self, config: Arc<RwLock<Config>>) -> CalendarResult<()> {
        let mut handle_lock = self.handle.write().await;
        if handle_lock.is_some() {
            return Err(component_error("calendar_sync is already running"));
        }

        let sources = match self.sources.write().await.take() {
            Some(sources) => sources,
            None => Self::file_sources(&*config.read().await)?,
        };

        let handle = CalendarSyncHandle::new(config.clone(), sources);
        *handle_lock = Some(handle.clone());
        drop(handle_lock);

        match handle.refresh(RefreshTrigger::Open).await {
            Ok(events) => info!("Initial timeline has {} events", events.len()),
            Err(e) => error!("Initial refresh failed: {}", e),
        }

        *self.scheduler.write().await = Some(start_scheduler(config, handle).await);

        Ok(())
    }

    async fn shutdown(&self) -> CalendarResult<()> {
        if let Some(scheduler) = self.scheduler.write().await.take() {
            scheduler.abort();
        }

        let handle_lock = self.handle.read().await;
        if let Some(handle) = &*handle_lock {
            handle.shutdown().await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
