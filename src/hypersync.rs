//! Client for the paginated log source.
//!
//! The source answers two calls: `GET /height` for the current archive head,
//! and `POST /query` for one page of logs starting at a block cursor. Each
//! page names the block to resume from in `next_block`.

use crate::error::SnapshotError;
use crate::events::TokenStandard;
use alloy_primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A log entry as delivered by the source. Only the requested fields are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawLog {
    pub topics: Vec<Option<B256>>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

impl RawLog {
    pub fn topic(&self, index: usize) -> Option<B256> {
        self.topics.get(index).copied().flatten()
    }

    /// Chain position, when the source supplied both parts of it.
    pub fn position(&self) -> Option<(u64, u64)> {
        Some((self.block_number?, self.log_index?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub from_block: u64,
    pub address: Address,
    pub topics: Vec<B256>,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    pub logs: Vec<RawLog>,
    pub next_block: Option<u64>,
    pub archive_height: Option<u64>,
}

#[async_trait]
pub trait LogSource: Send + Sync {
    async fn height(&self) -> Result<u64, SnapshotError>;

    async fn query(&self, query: &LogQuery) -> Result<LogPage, SnapshotError>;
}

/// Smallest field set the decoder for `standard` needs, plus the ordering key.
pub fn field_selection(standard: TokenStandard) -> Vec<String> {
    let mut fields = vec!["topic0", "topic1", "topic2", "topic3"];
    if standard != TokenStandard::Erc721 {
        fields.push("data");
    }
    fields.extend(["block_number", "log_index"]);
    fields.into_iter().map(String::from).collect()
}

#[derive(Serialize)]
struct QueryBody<'a> {
    from_block: u64,
    logs: Vec<LogSelection>,
    field_selection: FieldSelection<'a>,
}

#[derive(Serialize)]
struct LogSelection {
    address: Vec<String>,
    topics: Vec<Vec<String>>,
}

#[derive(Serialize)]
struct FieldSelection<'a> {
    log: &'a [String],
}

#[derive(Deserialize)]
struct HeightResponse {
    height: u64,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    data: Vec<ResponseBatch>,
    next_block: Option<u64>,
    archive_height: Option<u64>,
}

#[derive(Deserialize)]
struct ResponseBatch {
    #[serde(default)]
    logs: Vec<WireLog>,
}

#[derive(Deserialize)]
struct WireLog {
    topic0: Option<B256>,
    topic1: Option<B256>,
    topic2: Option<B256>,
    topic3: Option<B256>,
    data: Option<Bytes>,
    block_number: Option<u64>,
    log_index: Option<u64>,
}

impl From<WireLog> for RawLog {
    fn from(log: WireLog) -> Self {
        let mut topics = vec![log.topic0, log.topic1, log.topic2, log.topic3];
        while matches!(topics.last(), Some(None)) {
            topics.pop();
        }
        RawLog {
            topics,
            data: log.data.unwrap_or_default(),
            block_number: log.block_number,
            log_index: log.log_index,
        }
    }
}

fn build_query_body(query: &LogQuery) -> QueryBody<'_> {
    QueryBody {
        from_block: query.from_block,
        logs: vec![LogSelection {
            address: vec![format!("{:?}", query.address)],
            topics: vec![query.topics.iter().map(|t| format!("{t:?}")).collect()],
        }],
        field_selection: FieldSelection { log: &query.fields },
    }
}

fn parse_page(body: &str) -> Result<LogPage, SnapshotError> {
    let response: QueryResponse = serde_json::from_str(body)?;
    let logs = response
        .data
        .into_iter()
        .flat_map(|batch| batch.logs)
        .map(RawLog::from)
        .collect();

    Ok(LogPage {
        logs,
        next_block: response.next_block,
        archive_height: response.archive_height,
    })
}

#[derive(Clone)]
pub struct HyperSyncClient {
    http_client: Client,
    base_url: String,
    bearer_token: Option<String>,
    request_timeout: Duration,
}

impl HyperSyncClient {
    pub fn new(
        base_url: &str,
        bearer_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, SnapshotError> {
        let http_client = Client::builder().timeout(request_timeout).build()?;

        Ok(HyperSyncClient {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn handle_timeout(&self, endpoint: &str) -> SnapshotError {
        warn!(
            "Request timeout after {} seconds on {}{}",
            self.request_timeout.as_secs(),
            self.base_url,
            endpoint
        );
        SnapshotError::RequestTimeout(self.request_timeout)
    }

    /// Sends the request and reads the body under one deadline.
    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, SnapshotError> {
        let request = self.authorize(request);
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match timeout(self.request_timeout, exchange).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_timeout() => return Err(self.handle_timeout(endpoint)),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(self.handle_timeout(endpoint)),
        };

        if !status.is_success() {
            warn!("{}{} returned HTTP {}", self.base_url, endpoint, status);
            return Err(SnapshotError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl LogSource for HyperSyncClient {
    async fn height(&self) -> Result<u64, SnapshotError> {
        let url = format!("{}/height", self.base_url);
        let body = self.send("/height", self.http_client.get(url)).await?;
        let response: HeightResponse = serde_json::from_str(&body)?;
        debug!("Source height: {}", response.height);
        Ok(response.height)
    }

    async fn query(&self, query: &LogQuery) -> Result<LogPage, SnapshotError> {
        let url = format!("{}/query", self.base_url);
        let request = self.http_client.post(url).json(&build_query_body(query));
        let body = self.send("/query", request).await?;
        parse_page(&body)
    }
}
