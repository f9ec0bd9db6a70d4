//! HTTP surface for snapshot requests.
//!
//! `GET /api/snapshot` computes (or serves from cache) a holder snapshot and
//! renders it as JSON, CSV or a Merkle document. `GET /health` reports uptime.

use crate::config::Network;
use crate::error::SnapshotError;
use crate::events::TokenStandard;
use crate::query::formatters::{OutputFormat, format_snapshot};
use crate::snapshot::{SnapshotOptions, SnapshotRequest, SnapshotService};
use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const LIMITED_HEADER: &str = "x-snapshot-limited";
pub const CACHE_HEADER: &str = "x-snapshot-cache";

#[derive(Clone)]
pub struct AppState {
    pub service: SnapshotService,
    pub version: String,
    pub startup_time: i64,
}

impl AppState {
    pub fn new(service: SnapshotService) -> Self {
        Self {
            service,
            version: env!("CARGO_PKG_VERSION").to_string(),
            startup_time: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotParams {
    pub contract: Option<String>,
    pub network: Option<String>,
    pub standard: Option<String>,
    pub format: Option<String>,
    #[serde(default)]
    pub refresh: bool,
    pub api_key: Option<String>,
}

impl SnapshotParams {
    fn into_request(self) -> Result<(SnapshotRequest, OutputFormat), SnapshotError> {
        let contract_address = self
            .contract
            .ok_or_else(|| SnapshotError::InvalidAddress("missing contract parameter".into()))?;

        let network = match self.network.as_deref() {
            Some(raw) => raw
                .parse::<Network>()
                .map_err(|e| SnapshotError::InvalidRequest(e.to_string()))?,
            None => Network::Mainnet,
        };

        let standard = match self.standard.as_deref() {
            Some(raw) => raw
                .parse::<TokenStandard>()
                .map_err(|e| SnapshotError::InvalidRequest(e.to_string()))?,
            None => TokenStandard::Erc721,
        };

        let format = match self.format.as_deref() {
            Some(raw) => raw.parse::<OutputFormat>()?,
            None => OutputFormat::Json,
        };
        if format == OutputFormat::Table {
            return Err(SnapshotError::InvalidRequest(
                "table output is only available from the CLI".into(),
            ));
        }

        let credential = self.api_key.filter(|key| !key.trim().is_empty());

        let request = SnapshotRequest {
            contract_address,
            network,
            standard,
            options: SnapshotOptions {
                refresh: self.refresh,
                credential,
                with_merkle: format == OutputFormat::Merkle,
                bounds: None,
            },
        };
        Ok((request, format))
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let now = chrono::Utc::now().timestamp();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: now - state.startup_time,
    })
}

/// GET /api/snapshot
async fn snapshot_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SnapshotParams>,
) -> Response {
    match serve_snapshot(&state, params).await {
        Ok(response) => response,
        Err(e) => error_response(e),
    }
}

async fn serve_snapshot(state: &AppState, params: SnapshotParams) -> Result<Response, SnapshotError> {
    let (request, format) = params.into_request()?;
    info!(
        "Snapshot request for {} ({} on {}, format {:?})",
        request.contract_address, request.standard, request.network, format
    );

    let snapshot = state.service.compute_snapshot(request).await?;
    let body = format_snapshot(&snapshot, format)?;

    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, format.content_type())],
        body,
    )
        .into_response();

    let headers = response.headers_mut();
    if snapshot.limited {
        headers.insert(LIMITED_HEADER, HeaderValue::from_static("true"));
    }
    headers.insert(
        CACHE_HEADER,
        HeaderValue::from_static(if snapshot.from_cache { "hit" } else { "miss" }),
    );

    Ok(response)
}

fn error_response(err: SnapshotError) -> Response {
    match &err {
        SnapshotError::Busy { retry_after_secs } => {
            warn!("Snapshot request rejected: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({
                    "error": err.to_string(),
                    "retryAfter": retry_after_secs,
                })),
            )
                .into_response()
        }
        e if e.is_client_error() => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        e => {
            error!("Snapshot request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("Failed to fetch snapshot: {e}") })),
            )
                .into_response()
        }
    }
}

pub fn create_router(service: SnapshotService) -> Router {
    let state = Arc::new(AppState::new(service));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .with_state(state)
}
