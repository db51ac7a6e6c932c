//! Remote activity source
//!
//! Retrying client for the upstream paginated activity endpoint. Failures
//! are classified (connection / timeout / rate-limit-or-server / other) and
//! the retryable classes are re-attempted with linear backoff before the
//! error surfaces to the caller.

use crate::sync::backoff::BackoffPolicy;
use crate::sync::error::FetchError;
use crate::sync::trace::{FetchTrace, NoopTrace};
use crate::sync::types::{ActivityRecord, SortDirection};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Upstream cap on the `limit` query parameter
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Default upstream sort field
pub const DEFAULT_SORT_BY: &str = "TIMESTAMP";

/// Parameters of one page fetch
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub owner: String,
    pub limit: u32,
    pub offset: u32,
    pub sort_by: String,
    pub sort_direction: SortDirection,
    pub exclude_deposits_withdrawals: bool,
}

impl PageRequest {
    pub fn new(owner: &str, limit: u32, offset: u32, sort_direction: SortDirection) -> Self {
        Self {
            owner: owner.to_string(),
            limit,
            offset,
            sort_by: DEFAULT_SORT_BY.to_string(),
            sort_direction,
            exclude_deposits_withdrawals: true,
        }
    }

    pub fn exclude(mut self, exclude_deposits_withdrawals: bool) -> Self {
        self.exclude_deposits_withdrawals = exclude_deposits_withdrawals;
        self
    }
}

/// Source of paginated activity pages
///
/// The engine only talks to this trait, so tests can drive it with
/// scripted page sequences.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Fetch one page, ordered by timestamp per the request's direction
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<ActivityRecord>, FetchError>;
}

/// HTTP client for the upstream activity endpoint
pub struct RemoteActivitySource {
    client: reqwest::Client,
    base_url: String,
    backoff: BackoffPolicy,
    trace: Arc<dyn FetchTrace>,
}

impl RemoteActivitySource {
    pub fn new(base_url: &str, backoff: BackoffPolicy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36")
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            backoff,
            trace: Arc::new(NoopTrace),
        })
    }

    /// Install an observer for first-page responses
    pub fn with_trace(mut self, trace: Arc<dyn FetchTrace>) -> Self {
        self.trace = trace;
        self
    }

    async fn fetch_once(&self, request: &PageRequest) -> Result<Vec<ActivityRecord>, FetchError> {
        let limit = request.limit.min(MAX_PAGE_LIMIT);
        let url = format!("{}/v1/activity", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("user", request.owner.as_str()),
                ("limit", &limit.to_string()),
                ("offset", &request.offset.to_string()),
                ("sortBy", request.sort_by.as_str()),
                ("sortDirection", request.sort_direction.as_str()),
                (
                    "excludeDepositsWithdrawals",
                    if request.exclude_deposits_withdrawals {
                        "true"
                    } else {
                        "false"
                    },
                ),
            ])
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|_| FetchError::MalformedResponse)?;

        let items = body.as_array().ok_or(FetchError::MalformedResponse)?;

        if request.offset == 0 && !items.is_empty() {
            self.trace.first_page(request, &body);
        }

        Ok(items.iter().map(ActivityRecord::from_value).collect())
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(error.to_string())
    } else if error.is_connect() {
        FetchError::Connection(error.to_string())
    } else {
        FetchError::Request(error.to_string())
    }
}

#[async_trait]
impl ActivitySource for RemoteActivitySource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<ActivityRecord>, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(request).await {
                Ok(records) => return Ok(records),
                Err(e) if e.is_retryable() && attempt < self.backoff.max_attempts => {
                    let delay = self.backoff.delay(attempt);
                    log::warn!(
                        "Fetch failed for {} at offset {} (attempt {}/{}), retrying in {:?}: {}",
                        request.owner,
                        request.offset,
                        attempt,
                        self.backoff.max_attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
