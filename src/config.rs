use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_MAINNET_URL: &str = "https://eth.hypersync.xyz";
const DEFAULT_TESTNET_URL: &str = "https://sepolia.hypersync.xyz";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 3600; // one hour
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(anyhow::anyhow!(
                "Unknown network '{}', expected testnet or mainnet",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub hypersync_mainnet_url: String,
    pub hypersync_testnet_url: String,
    /// Shared upstream credential. Requests that use it go through admission control.
    pub bearer_token: Option<String>,
    pub database_url: String,
    pub server_addr: String,
    pub request_timeout: Duration,
    pub fetch_timeout: Option<Duration>,
    pub max_iterations: Option<usize>,
    pub cache_ttl: Duration,
    pub retry_after_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let hypersync_mainnet_url = std::env::var("HYPERSYNC_MAINNET_URL")
            .unwrap_or_else(|_| DEFAULT_MAINNET_URL.to_string());

        let hypersync_testnet_url = std::env::var("HYPERSYNC_TESTNET_URL")
            .unwrap_or_else(|_| DEFAULT_TESTNET_URL.to_string());

        let bearer_token = std::env::var("HYPERSYNC_BEARER_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./snapshots.db".to_string());

        let server_addr =
            std::env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let request_timeout = Duration::from_secs(
            parse_env::<u64>("REQUEST_TIMEOUT_SECS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        let fetch_timeout = parse_env::<u64>("FETCH_TIMEOUT_SECS")?.map(Duration::from_secs);
        let max_iterations = parse_env::<usize>("MAX_ITERATIONS")?;
        let cache_ttl = Duration::from_secs(
            parse_env::<u64>("CACHE_TTL_SECS")?.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        );
        let retry_after_secs =
            parse_env::<u64>("RETRY_AFTER_SECS")?.unwrap_or(DEFAULT_RETRY_AFTER_SECS);

        Ok(Config {
            hypersync_mainnet_url,
            hypersync_testnet_url,
            bearer_token,
            database_url,
            server_addr,
            request_timeout,
            fetch_timeout,
            max_iterations,
            cache_ttl,
            retry_after_secs,
        })
    }

    pub fn source_url(&self, network: Network) -> &str {
        match network {
            Network::Mainnet => &self.hypersync_mainnet_url,
            Network::Testnet => &self.hypersync_testnet_url,
        }
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid {name} value: {raw}")),
        _ => Ok(None),
    }
}
