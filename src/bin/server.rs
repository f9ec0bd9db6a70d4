use anyhow::{Context, Result};
use token_snapshot::config::Config;
use token_snapshot::server::create_router;
use token_snapshot::snapshot::SnapshotService;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting token snapshot server");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Mainnet source: {}", config.hypersync_mainnet_url);
    info!("Testnet source: {}", config.hypersync_testnet_url);
    if config.bearer_token.is_none() {
        info!("No shared upstream token configured");
    }

    let service = SnapshotService::from_config(&config)?;
    info!("Snapshot cache at {}", config.database_url);

    let listener = tokio::net::TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server_addr))?;
    info!("Listening on {}", config.server_addr);

    axum::serve(listener, create_router(service))
        .await
        .context("HTTP server error")?;

    Ok(())
}
