mod shutdown;
mod startup;

use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    startup::init_logging()?;

    info!("Starting famcal");

    // Load configuration
    let config = startup::load_config().await?;

    // Start the engine
    startup::start_engine(config).await
}
