use std::time::Duration;

/// Failures surfaced by a snapshot computation.
///
/// Malformed individual logs never show up here; the decoder counts and
/// skips them. Hitting a fetch bound is not an error either: the snapshot is
/// returned with `limited` set.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Invalid contract address: {0}")]
    InvalidAddress(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Another shared-credential fetch is already in flight.
    #[error("Snapshot service is busy, retry in {retry_after_secs} seconds")]
    Busy { retry_after_secs: u64 },

    #[error("Request timed out after {} seconds", .0.as_secs())]
    RequestTimeout(Duration),

    #[error("Upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse upstream response: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnapshotError {
    /// Retry hint in seconds for admission rejections.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            SnapshotError::Busy { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SnapshotError::InvalidAddress(_) | SnapshotError::InvalidRequest(_)
        )
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        SnapshotError::Parse(e.to_string())
    }
}

impl From<tokio::task::JoinError> for SnapshotError {
    fn from(e: tokio::task::JoinError) -> Self {
        SnapshotError::Internal(e.to_string())
    }
}
