use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use token_snapshot::config::{Config, Network};
use token_snapshot::events::TokenStandard;
use token_snapshot::query::formatters::{OutputFormat, format_snapshot};
use token_snapshot::repository::Database;
use token_snapshot::scanner::FetchBounds;
use token_snapshot::snapshot::{
    HyperSyncProvider, ServiceSettings, SnapshotOptions, SnapshotRequest, SnapshotService,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snapshot")]
#[command(about = "Reconstruct token holder snapshots from transfer logs", long_about = None)]
struct Cli {
    /// Token contract address (0x followed by 40 hex characters)
    contract: String,

    #[arg(short, long, default_value = "mainnet")]
    network: Network,

    #[arg(short, long, default_value = "erc721")]
    standard: TokenStandard,

    /// table, json, csv or merkle
    #[arg(short, long, default_value = "table")]
    format: OutputFormat,

    /// Stop fetching after this many seconds and return a partial snapshot
    #[arg(long)]
    timeout: Option<u64>,

    /// Stop fetching after this many pages and return a partial snapshot
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Ignore a cached ERC-721 snapshot
    #[arg(long, default_value = "false")]
    refresh: bool,

    /// Skip the snapshot cache entirely
    #[arg(long, default_value = "false")]
    no_cache: bool,

    /// Upstream API token, overrides HYPERSYNC_BEARER_TOKEN
    #[arg(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let mut settings = ServiceSettings::from(&config);
    if cli.timeout.is_some() || cli.max_iterations.is_some() {
        settings.bounds = FetchBounds {
            timeout: cli.timeout.map(Duration::from_secs),
            max_iterations: cli.max_iterations,
        };
    }

    let cache = if cli.no_cache {
        None
    } else {
        Some(Database::new(&config.database_url)?)
    };
    let service = SnapshotService::new(
        Arc::new(HyperSyncProvider::new(config.clone())),
        cache,
        settings,
    );

    let request = SnapshotRequest {
        contract_address: cli.contract,
        network: cli.network,
        standard: cli.standard,
        options: SnapshotOptions {
            refresh: cli.refresh,
            credential: cli.token,
            with_merkle: cli.format == OutputFormat::Merkle,
            bounds: None,
        },
    };

    let snapshot = match service.compute_snapshot(request).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("Snapshot failed: {}", e);
            return Err(e.into());
        }
    };

    if snapshot.limited {
        info!("Fetch bounds were hit, the snapshot is partial");
    }

    println!("{}", format_snapshot(&snapshot, cli.format)?);

    Ok(())
}
