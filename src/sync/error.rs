//! Error taxonomy for fetch, storage, and sync operations

use thiserror::Error;

/// Failure of a single upstream fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection-level failure (DNS, refused, reset)
    #[error("upstream connection failed: {0}")]
    Connection(String),

    /// Request or response timed out
    #[error("upstream request timed out: {0}")]
    Timeout(String),

    /// Upstream answered with a non-success status
    #[error("upstream returned HTTP {status}")]
    Status { status: u16 },

    /// Any other client-side request failure (not retried)
    #[error("upstream request failed: {0}")]
    Request(String),

    /// Response body was not the expected JSON array
    #[error("upstream response was not a JSON array")]
    MalformedResponse,
}

impl FetchError {
    /// Connection failures, timeouts, and rate-limit/server statuses are
    /// retried with backoff; everything else is terminal for the fetch.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Connection(_) | FetchError::Timeout(_) => true,
            FetchError::Status { status } => *status == 429 || *status >= 500,
            FetchError::Request(_) | FetchError::MalformedResponse => false,
        }
    }
}

/// Failure inside the cache store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Terminal failure of a `get_page` / `get_all` call
///
/// The engine only raises these when it has nothing at all to return;
/// partial upstream failures degrade to cached data instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch failed and no cached data is available: {0}")]
    Upstream(#[from] FetchError),

    #[error("cache error: {0}")]
    Store(#[from] StoreError),

    #[error("sync cancelled by caller")]
    Cancelled,
}
