use crate::shutdown;
use famcal::components::calendar::filters::{CalendarView, MemberSelector};
use famcal::components::calendar::CalendarSync;
use famcal::components::ComponentManager;
use famcal::config::Config;
use famcal::error::Error;
use std::sync::Arc;
use tokio::sync::{oneshot, RwLock};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Start the components and run until a termination signal arrives
pub async fn start_engine(config: Arc<RwLock<Config>>) -> miette::Result<()> {
    let mut component_manager = ComponentManager::new(Arc::clone(&config));

    // Register the calendar sync component
    component_manager.register(CalendarSync::new());

    let component_manager = Arc::new(component_manager);
    component_manager.init_all().await?;

    log_upcoming(&component_manager).await;

    // Create shutdown channel
    let (shutdown_send, shutdown_recv) = oneshot::channel();

    // Spawn signal handler task
    let shutdown_components = Arc::clone(&component_manager);
    tokio::spawn(async move {
        shutdown::handle_signals(shutdown_send, shutdown_components).await;
    });

    info!("Engine running, press Ctrl+C to stop");

    if shutdown_recv.await.is_err() {
        error!("Signal handler ended without a shutdown signal");
    }

    info!("Engine stopped");
    Ok(())
}

/// Print the upcoming view once at startup
async fn log_upcoming(component_manager: &ComponentManager) {
    let Some(calendar) = component_manager.get::<CalendarSync>() else {
        return;
    };
    let Some(handle) = calendar.get_handle().await else {
        return;
    };

    match handle.upcoming(CalendarView::All, MemberSelector::All).await {
        Ok(events) => {
            for event in events {
                info!(
                    "Upcoming: {} at {} ({} attendees)",
                    event.title,
                    event.start_at,
                    event.attendees.len()
                );
            }
        }
        Err(e) => error!("Failed to read upcoming events: {}", e),
    }
}
