use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration as TokioDuration};
use tracing::{error, info};

use super::actor::RefreshTrigger;
use super::handle::CalendarSyncHandle;
use crate::config::Config;

/// Start the periodic refresh loop
pub async fn start_scheduler(config: Arc<RwLock<Config>>, handle: CalendarSyncHandle) -> JoinHandle<()> {
    let interval = config.read().await.refresh_interval_secs.max(1);
    info!("Refreshing the calendar every {}s", interval);

    tokio::spawn(async move {
        loop {
            sleep(TokioDuration::from_secs(interval)).await;

            match handle.refresh(RefreshTrigger::Timer).await {
                Ok(events) => info!("Periodic refresh returned {} events", events.len()),
                Err(e) => {
                    // Mailbox closed means the actor is gone
                    error!("Periodic refresh failed, stopping scheduler: {}", e);
                    break;
                }
            }
        }
    })
}
