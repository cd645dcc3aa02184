//! Ticketing service entry point.

use std::error::Error;

use ticketing_app::Application;
use ticketing_store::config::StoreConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting ticketing service");

    // Read configuration from environment.
    let config = StoreConfig::from_env()?;

    // Connect and build declared indexes.
    let app = Application::bootstrap(&config).await?;

    tracing::info!(pool_size = app.store.pool().size(), "Ticketing service ready");

    app.store.pool().close().await;

    Ok(())
}
