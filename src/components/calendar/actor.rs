use super::aggregate::{aggregate, SourceBatch, SourcePriority};
use super::attendees::resolve_attendees;
use super::conflicts::{family_availability, find_conflicts, Availability};
use super::dedup::DedupCache;
use super::filters::{upcoming, CalendarView, MemberSelector};
use super::ledger::{AddState, AddedLedger};
use super::models::{AddEventOutcome, CanonicalEvent, EventPatch, EventSource, FamilyMember, RawEvent};
use super::normalize::{normalize, NormalizeOptions};
use super::provider::{EventProvider, EventRepository, FamilyDirectory, TaskSource};
use super::synthesized::{family_meeting_event, task_due_events};
use super::time::now_in;
use crate::config::Config;
use crate::error::{component_error, config_error, persistence_error, CalendarResult};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use chrono_tz::Tz;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// What caused a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// The calendar was opened
    Open,
    /// Periodic scheduler tick
    Timer,
    /// Another part of the app changed events
    External,
    /// A day was picked in the calendar
    DateSelected(NaiveDate),
    /// Explicit user request
    Forced,
}

impl fmt::Display for RefreshTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Timer => f.write_str("timer"),
            Self::External => f.write_str("external"),
            Self::DateSelected(day) => write!(f, "date-selected({})", day),
            Self::Forced => f.write_str("forced"),
        }
    }
}

/// An external calendar feeding the timeline
#[derive(Clone)]
pub struct ProviderSource {
    pub name: String,
    pub source: EventSource,
    pub provider: Arc<dyn EventProvider>,
}

impl ProviderSource {
    pub fn new(name: impl Into<String>, source: EventSource, provider: Arc<dyn EventProvider>) -> Self {
        Self {
            name: name.into(),
            source,
            provider,
        }
    }
}

/// Collaborators the actor reads from and writes to
#[derive(Clone)]
pub struct CalendarSources {
    pub providers: Vec<ProviderSource>,
    /// Events authored in the app, read back for every refresh
    pub user_events: Arc<dyn EventProvider>,
    pub repository: Arc<dyn EventRepository>,
    pub directory: Arc<dyn FamilyDirectory>,
    pub tasks: Arc<dyn TaskSource>,
}

impl CalendarSources {
    /// Use one store both as the user-authored source and as the repository
    pub fn with_store<S>(
        providers: Vec<ProviderSource>,
        store: Arc<S>,
        directory: Arc<dyn FamilyDirectory>,
        tasks: Arc<dyn TaskSource>,
    ) -> Self
    where
        S: EventProvider + EventRepository + 'static,
    {
        Self {
            providers,
            user_events: store.clone(),
            repository: store,
            directory,
            tasks,
        }
    }
}

/// Everything a refresh needs, captured when it is issued
#[derive(Debug, Clone)]
struct RefreshRequest {
    generation: u64,
    family_id: String,
    principal_id: String,
    tz: Tz,
    now: DateTime<FixedOffset>,
    range_start: NaiveDate,
    range_end: NaiveDate,
    meeting_cycle: u32,
}

/// Commands that can be sent to the calendar sync actor
pub enum CalendarCommand {
    Refresh(RefreshTrigger, mpsc::Sender<CalendarResult<Vec<CanonicalEvent>>>),
    GetEvents(mpsc::Sender<Vec<CanonicalEvent>>),
    Upcoming {
        view: CalendarView,
        selector: MemberSelector,
        response: mpsc::Sender<CalendarResult<Vec<CanonicalEvent>>>,
    },
    FindConflicts(CanonicalEvent, mpsc::Sender<Vec<CanonicalEvent>>),
    Availability(CanonicalEvent, mpsc::Sender<BTreeMap<String, Availability>>),
    AddEvent(RawEvent, mpsc::Sender<CalendarResult<AddEventOutcome>>),
    UpdateEvent(String, EventPatch, mpsc::Sender<CalendarResult<bool>>),
    DeleteEvent(String, mpsc::Sender<CalendarResult<bool>>),
    IsAdded(CanonicalEvent, mpsc::Sender<bool>),
    GetAddState(CanonicalEvent, mpsc::Sender<Option<AddState>>),
    Shutdown,
}

/// Work spawned by the actor reporting back. Only the actor holds the sender.
enum Completion {
    Refresh {
        generation: u64,
        events: Vec<CanonicalEvent>,
        cache: DedupCache,
        directory: Vec<FamilyMember>,
    },
    Add {
        candidate: CanonicalEvent,
        outcome: CalendarResult<AddEventOutcome>,
        response: mpsc::Sender<CalendarResult<AddEventOutcome>>,
    },
}

/// Handle for communicating with the calendar sync actor
#[derive(Clone)]
pub struct CalendarSyncActorHandle {
    command_tx: mpsc::Sender<CalendarCommand>,
}

impl CalendarSyncActorHandle {
    async fn request<T: Send>(
        &self,
        make: impl FnOnce(mpsc::Sender<T>) -> CalendarCommand + Send,
    ) -> CalendarResult<T> {
        let (response_tx, mut response_rx) = mpsc::channel(1);
        self.command_tx
            .send(make(response_tx))
            .await
            .map_err(|e| component_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .recv()
            .await
            .ok_or_else(|| component_error("Response channel closed"))
    }

    /// Reload every source. Resolves with the timeline of the latest refresh.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> CalendarResult<Vec<CanonicalEvent>> {
        self.request(|tx| CalendarCommand::Refresh(trigger, tx)).await?
    }

    pub async fn events(&self) -> CalendarResult<Vec<CanonicalEvent>> {
        self.request(CalendarCommand::GetEvents).await
    }

    pub async fn upcoming(
        &self,
        view: CalendarView,
        selector: MemberSelector,
    ) -> CalendarResult<Vec<CanonicalEvent>> {
        self.request(|response| CalendarCommand::Upcoming {
            view,
            selector,
            response,
        })
        .await?
    }

    pub async fn conflicts_for(&self, event: CanonicalEvent) -> CalendarResult<Vec<CanonicalEvent>> {
        self.request(|tx| CalendarCommand::FindConflicts(event, tx)).await
    }

    pub async fn availability_for(
        &self,
        event: CanonicalEvent,
    ) -> CalendarResult<BTreeMap<String, Availability>> {
        self.request(|tx| CalendarCommand::Availability(event, tx)).await
    }

    pub async fn add_event(&self, event: RawEvent) -> CalendarResult<AddEventOutcome> {
        self.request(|tx| CalendarCommand::AddEvent(event, tx)).await?
    }

    pub async fn update_event(&self, id: &str, patch: EventPatch) -> CalendarResult<bool> {
        let id = id.to_string();
        self.request(|tx| CalendarCommand::UpdateEvent(id, patch, tx)).await?
    }

    pub async fn delete_event(&self, id: &str) -> CalendarResult<bool> {
        let id = id.to_string();
        self.request(|tx| CalendarCommand::DeleteEvent(id, tx)).await?
    }

    pub async fn is_added(&self, event: CanonicalEvent) -> CalendarResult<bool> {
        self.request(|tx| CalendarCommand::IsAdded(event, tx)).await
    }

    pub async fn add_state(&self, event: CanonicalEvent) -> CalendarResult<Option<AddState>> {
        self.request(|tx| CalendarCommand::GetAddState(event, tx)).await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> CalendarResult<()> {
        let _ = self.command_tx.send(CalendarCommand::Shutdown).await;
        Ok(())
    }
}

/// The calendar sync actor. Owns the accepted timeline and processes commands
/// one at a time.
pub struct CalendarSyncActor {
    config: Arc<RwLock<Config>>,
    sources: CalendarSources,
    command_rx: mpsc::Receiver<CalendarCommand>,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    events: Vec<CanonicalEvent>,
    cache: DedupCache,
    directory: Vec<FamilyMember>,
    ledger: AddedLedger,
    /// Latest generation issued. Local writes bump it too.
    generation: u64,
    waiting: Vec<mpsc::Sender<CalendarResult<Vec<CanonicalEvent>>>>,
}

impl CalendarSyncActor {
    /// Create a new actor and return its handle
    pub fn new(config: Arc<RwLock<Config>>, sources: CalendarSources) -> (Self, CalendarSyncActorHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (completion_tx, completion_rx) = mpsc::channel(32);

        let actor = Self {
            config,
            sources,
            command_rx,
            completion_tx,
            completion_rx,
            events: Vec::new(),
            cache: DedupCache::new(),
            directory: Vec::new(),
            ledger: AddedLedger::new(),
            generation: 0,
            waiting: Vec::new(),
        };

        let handle = CalendarSyncActorHandle { command_tx };

        (actor, handle)
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Calendar sync actor started");

        loop {
            tokio::select! {
                Some(done) = self.completion_rx.recv() => {
                    self.handle_completion(done).await;
                }
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        break;
                    };
                    if !self.handle_command(cmd).await {
                        info!("Calendar sync actor shutting down");
                        break;
                    }
                }
            }
        }

        info!("Calendar sync actor shut down");
    }

    /// Returns false once the actor should stop
    async fn handle_command(&mut self, cmd: CalendarCommand) -> bool {
        match cmd {
            CalendarCommand::Refresh(trigger, response_tx) => {
                self.start_refresh(trigger, response_tx).await;
            }
            CalendarCommand::GetEvents(response_tx) => {
                let _ = response_tx.send(self.events.clone()).await;
            }
            CalendarCommand::Upcoming {
                view,
                selector,
                response,
            } => {
                let result = self.upcoming(view, &selector).await;
                let _ = response.send(result).await;
            }
            CalendarCommand::FindConflicts(target, response_tx) => {
                let rules = self.config.read().await.conflict_rules();
                let conflicts = find_conflicts(&target, &self.events, &rules);
                let _ = response_tx.send(conflicts).await;
            }
            CalendarCommand::Availability(target, response_tx) => {
                let rules = self.config.read().await.conflict_rules();
                let conflicts = find_conflicts(&target, &self.events, &rules);
                let availability = family_availability(&conflicts, &self.directory);
                let _ = response_tx.send(availability).await;
            }
            CalendarCommand::AddEvent(raw, response_tx) => {
                self.start_add(raw, response_tx).await;
            }
            CalendarCommand::UpdateEvent(id, patch, response_tx) => {
                let result = self.update_event(&id, patch).await;
                let _ = response_tx.send(result).await;
            }
            CalendarCommand::DeleteEvent(id, response_tx) => {
                let result = self.delete_event(&id).await;
                let _ = response_tx.send(result).await;
            }
            CalendarCommand::IsAdded(event, response_tx) => {
                let _ = response_tx.send(self.ledger.is_added(&event)).await;
            }
            CalendarCommand::GetAddState(event, response_tx) => {
                let _ = response_tx.send(self.ledger.state(&event)).await;
            }
            CalendarCommand::Shutdown => return false,
        }
        true
    }

    async fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Refresh {
                generation,
                events,
                cache,
                directory,
            } => {
                self.complete_refresh(generation, events, cache, directory).await;
            }
            Completion::Add {
                candidate,
                outcome,
                response,
            } => {
                let result = self.complete_add(candidate, outcome).await;
                let _ = response.send(result).await;
            }
        }
    }

    async fn normalize_options(&self) -> CalendarResult<NormalizeOptions> {
        let tz = self.config.read().await.tz()?;
        Ok(NormalizeOptions::new(tz))
    }

    async fn start_refresh(
        &mut self,
        trigger: RefreshTrigger,
        response_tx: mpsc::Sender<CalendarResult<Vec<CanonicalEvent>>>,
    ) {
        match self.issue_refresh(trigger).await {
            Ok(()) => self.waiting.push(response_tx),
            Err(e) => {
                let _ = response_tx.send(Err(e)).await;
            }
        }
    }

    /// Bump the generation and spawn a fetch under it
    async fn issue_refresh(&mut self, trigger: RefreshTrigger) -> CalendarResult<()> {
        let request = {
            let config = self.config.read().await;
            let tz = config.tz()?;
            let now = now_in(&tz);
            let today = now.date_naive();

            let range_start = Duration::try_days(config.settings.fetch_days_back)
                .and_then(|back| today.checked_sub_signed(back))
                .ok_or_else(|| config_error("fetch_days_back is out of range"))?;
            let range_end = Duration::try_days(config.settings.fetch_days_ahead)
                .and_then(|ahead| today.checked_add_signed(ahead))
                .ok_or_else(|| config_error("fetch_days_ahead is out of range"))?;

            self.generation += 1;
            RefreshRequest {
                generation: self.generation,
                family_id: config.family_id.clone(),
                principal_id: config.principal_id.clone(),
                tz,
                now,
                range_start,
                range_end,
                meeting_cycle: config.settings.meeting_cycle,
            }
        };

        info!("Refresh {} issued ({})", request.generation, trigger);

        let sources = self.sources.clone();
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let generation = request.generation;
            let (events, cache, directory) = Self::collect(request, sources).await;
            let _ = completion_tx
                .send(Completion::Refresh {
                    generation,
                    events,
                    cache,
                    directory,
                })
                .await;
        });

        Ok(())
    }

    /// A local write makes every refresh in flight stale. Callers still
    /// waiting get a refresh that reads the store after the write.
    async fn invalidate_refreshes(&mut self) {
        if self.waiting.is_empty() {
            self.generation += 1;
            return;
        }

        if let Err(e) = self.issue_refresh(RefreshTrigger::External).await {
            warn!("Could not reissue refresh after a local write: {}", e);
            for waiter in self.waiting.drain(..) {
                let _ = waiter
                    .send(Err(component_error("Refresh superseded by a local write")))
                    .await;
            }
        }
    }

    /// Accept a refresh result unless a newer refresh or a local write
    /// happened meanwhile
    async fn complete_refresh(
        &mut self,
        generation: u64,
        events: Vec<CanonicalEvent>,
        cache: DedupCache,
        directory: Vec<FamilyMember>,
    ) {
        if generation != self.generation {
            debug!(
                "Discarding refresh {} (latest is {})",
                generation, self.generation
            );
            return;
        }

        info!("Refresh {} accepted with {} events", generation, events.len());
        self.events = events;
        self.cache = cache;
        self.directory = directory;

        for waiter in self.waiting.drain(..) {
            let _ = waiter.send(Ok(self.events.clone())).await;
        }
    }

    /// Fetch every source concurrently and merge them with a fresh cache
    async fn collect(
        request: RefreshRequest,
        sources: CalendarSources,
    ) -> (Vec<CanonicalEvent>, DedupCache, Vec<FamilyMember>) {
        let principal_id = request.principal_id.as_str();
        let (range_start, range_end) = (request.range_start, request.range_end);

        let provider_fetches = sources.providers.iter().map(|p| async move {
            let outcome = p.provider.fetch_events(principal_id, range_start, range_end).await;
            SourceBatch::new(p.name.clone(), SourcePriority::Provider, p.source, outcome)
        });

        let (provider_batches, user_events, tasks, directory) = futures::join!(
            join_all(provider_fetches),
            sources.user_events.fetch_events(principal_id, range_start, range_end),
            sources.tasks.list_tasks(&request.family_id),
            sources.directory.list_members(&request.family_id),
        );

        let directory = directory.unwrap_or_else(|e| {
            warn!("Family directory unavailable, attendees fall back to placeholders: {}", e);
            Vec::new()
        });

        let mut batches = provider_batches;

        let meeting = family_meeting_event(request.meeting_cycle, None, request.now, &request.tz);
        batches.push(SourceBatch::ok(
            "family-meeting",
            SourcePriority::SystemMeeting,
            EventSource::System,
            meeting.into_iter().collect(),
        ));

        batches.push(SourceBatch::new(
            "tasks",
            SourcePriority::TaskDueDate,
            EventSource::TaskSystem,
            tasks.map(|tasks| task_due_events(&tasks, &request.tz)),
        ));

        batches.push(SourceBatch::new(
            "user",
            SourcePriority::UserAuthored,
            EventSource::Manual,
            user_events,
        ));

        let opts = NormalizeOptions::new(request.tz).with_now(request.now);
        let mut cache = DedupCache::new();
        let events = aggregate(batches, &mut cache, &directory, &opts);

        (events, cache, directory)
    }

    async fn upcoming(
        &self,
        view: CalendarView,
        selector: &MemberSelector,
    ) -> CalendarResult<Vec<CanonicalEvent>> {
        let config = self.config.read().await;
        let now = now_in(&config.tz()?);
        Ok(upcoming(
            &self.events,
            now,
            view,
            selector,
            config.settings.upcoming_limit,
        ))
    }

    /// Mark the event pending and write it in the background. The caller is
    /// answered once the write lands.
    async fn start_add(
        &mut self,
        raw: RawEvent,
        response_tx: mpsc::Sender<CalendarResult<AddEventOutcome>>,
    ) {
        let opts = match self.normalize_options().await {
            Ok(opts) => opts,
            Err(e) => {
                let _ = response_tx.send(Err(e)).await;
                return;
            }
        };
        let candidate = normalize(&raw, EventSource::Manual, &opts);

        if self.ledger.is_added(&candidate) {
            info!("{} was already added", candidate.title);
            let _ = response_tx
                .send(Ok(AddEventOutcome {
                    success: true,
                    event_id: candidate.internal_id.clone(),
                    is_mock: false,
                    is_duplicate: true,
                }))
                .await;
            return;
        }

        self.ledger.mark_pending(&candidate);

        let repository = Arc::clone(&self.sources.repository);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = repository.add_event(raw).await;
            let _ = completion_tx
                .send(Completion::Add {
                    candidate,
                    outcome,
                    response: response_tx,
                })
                .await;
        });
    }

    async fn complete_add(
        &mut self,
        candidate: CanonicalEvent,
        outcome: CalendarResult<AddEventOutcome>,
    ) -> CalendarResult<AddEventOutcome> {
        let outcome = match outcome {
            Ok(outcome) if outcome.success => outcome,
            Ok(_) => {
                warn!("Repository refused {}", candidate.title);
                self.ledger.mark_failed(&candidate);
                return Err(persistence_error(&format!(
                    "Repository refused to store {}",
                    candidate.title
                )));
            }
            Err(e) => {
                warn!("Failed to add {}: {}", candidate.title, e);
                self.ledger.mark_failed(&candidate);
                return Err(e);
            }
        };

        self.ledger.mark_added(&candidate);

        let mut stored = candidate;
        stored.internal_id = outcome.event_id.clone();
        self.ledger.mark_added(&stored);

        if self.cache.mark_seen(&stored) {
            stored.attendees = resolve_attendees(&stored, &self.directory);
            self.events.push(stored);
        }

        self.invalidate_refreshes().await;
        Ok(outcome)
    }

    async fn update_event(&mut self, id: &str, patch: EventPatch) -> CalendarResult<bool> {
        let updated = self.sources.repository.update_event(id, patch).await?;
        if updated {
            self.invalidate_refreshes().await;
        }
        Ok(updated)
    }

    async fn delete_event(&mut self, id: &str) -> CalendarResult<bool> {
        let removed = self.sources.repository.delete_event(id).await?;
        if !removed {
            return Ok(false);
        }

        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| e.internal_id.as_deref() == Some(id) || e.external_id.as_deref() == Some(id));
        self.events = kept;

        for event in &gone {
            self.cache.forget(event);
            self.ledger.forget(event);
        }

        info!("Deleted {} ({} local copies dropped)", id, gone.len());
        self.invalidate_refreshes().await;
        Ok(true)
    }
}
