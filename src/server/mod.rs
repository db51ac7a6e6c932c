//! HTTP serving layer
//!
//! Thin boundary over the query façade: validates request parameters
//! (including the owner address format, which the engine assumes is
//! already checked), maps sync errors to HTTP statuses, and wraps results
//! in a JSON envelope.

use crate::sync::error::SyncError;
use crate::sync::query::{QueryOptions, QueryService};
use crate::sync::source::MAX_PAGE_LIMIT;
use crate::sync::types::SortDirection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

const MAX_OFFSET_PARAM: u32 = 10_000;

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub upstream_base: String,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(query: Arc<QueryService>, upstream_base: &str) -> Self {
        Self {
            query,
            upstream_base: upstream_base.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

/// Build the application router with permissive CORS
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/activity", get(activity))
        .route("/activity/all", get(activity_all))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/clear", delete(cache_clear))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Envelope and errors
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ActivityResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Sync(SyncError),
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        ApiError::Sync(e)
    }
}

impl From<crate::sync::error::StoreError> for ApiError {
    fn from(e: crate::sync::error::StoreError) -> Self {
        ApiError::Sync(SyncError::Store(e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            ApiError::Validation(detail) => {
                (StatusCode::BAD_REQUEST, "invalid request", detail)
            }
            ApiError::Sync(SyncError::Upstream(e)) => {
                (StatusCode::BAD_GATEWAY, "upstream fetch failed", e.to_string())
            }
            ApiError::Sync(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error",
                e.to_string(),
            ),
        };

        let body = json!({
            "success": false,
            "error": error,
            "detail": detail,
        });
        (status, Json(body)).into_response()
    }
}

/// Owner addresses are 0x-prefixed 40-hex-char strings; the engine relies
/// on this being checked here.
pub fn validate_owner(user: &str) -> Result<(), ApiError> {
    match user.strip_prefix("0x") {
        Some(hex) if hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()) => Ok(()),
        _ => Err(ApiError::Validation(format!(
            "invalid user address: {:?} (expected 0x followed by 40 hex characters)",
            user
        ))),
    }
}

fn parse_direction(raw: Option<&str>) -> Result<SortDirection, ApiError> {
    match raw {
        None => Ok(SortDirection::Desc),
        Some(s) => s
            .parse()
            .map_err(|e: String| ApiError::Validation(e)),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn root() -> Json<Value> {
    Json(json!({
        "service": "polyflow",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/activity": "paginated user activity (limit 0 or -1 for full history)",
            "/activity/all": "full activity history within the retention window",
            "/cache/stats": "cache statistics",
            "/cache/clear": "clear one user's cache (DELETE)",
            "/health": "health check",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let upstream = state
        .http
        .get(format!("{}/health", state.upstream_base))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false);

    Json(json!({
        "status": "healthy",
        "upstream": if upstream { "accessible" } else { "unavailable" },
    }))
}

#[derive(Debug, Deserialize)]
struct ActivityParams {
    user: String,
    /// 1..=500 paginates; 0 or -1 fetches full history
    limit: Option<i64>,
    offset: Option<u32>,
    sort_direction: Option<String>,
    use_cache: Option<bool>,
    exclude_deposits_withdrawals: Option<bool>,
}

async fn activity(
    State(state): State<AppState>,
    Query(params): Query<ActivityParams>,
) -> Result<Json<ActivityResponse>, ApiError> {
    validate_owner(&params.user)?;

    let options = QueryOptions {
        sort_direction: parse_direction(params.sort_direction.as_deref())?,
        use_cache: params.use_cache.unwrap_or(true),
        exclude_deposits_withdrawals: params.exclude_deposits_withdrawals.unwrap_or(true),
    };

    let limit = params.limit.unwrap_or(100);
    let cancel = CancellationToken::new();

    let (records, message) = if limit <= 0 {
        let records = state
            .query
            .full_history(&params.user, None, None, &options, &cancel)
            .await?;
        let message = format!("fetched all {} activity records", records.len());
        (records, message)
    } else {
        if limit > MAX_PAGE_LIMIT as i64 {
            return Err(ApiError::Validation(format!(
                "limit must be at most {}",
                MAX_PAGE_LIMIT
            )));
        }
        let offset = params.offset.unwrap_or(0);
        if offset > MAX_OFFSET_PARAM {
            return Err(ApiError::Validation(format!(
                "offset must be at most {}",
                MAX_OFFSET_PARAM
            )));
        }

        let records = state
            .query
            .page(&params.user, limit as u32, offset, &options, &cancel)
            .await?;
        let message = format!(
            "fetched {} activity records (offset: {}, limit: {})",
            records.len(),
            offset,
            limit
        );
        (records, message)
    };

    Ok(Json(ActivityResponse {
        success: true,
        count: records.len(),
        data: records.into_iter().map(|r| r.payload).collect(),
        message: Some(message),
    }))
}

#[derive(Debug, Deserialize)]
struct ActivityAllParams {
    user: String,
    sort_direction: Option<String>,
    batch_size: Option<u32>,
    max_records: Option<usize>,
    use_cache: Option<bool>,
    exclude_deposits_withdrawals: Option<bool>,
}

async fn activity_all(
    State(state): State<AppState>,
    Query(params): Query<ActivityAllParams>,
) -> Result<Json<ActivityResponse>, ApiError> {
    validate_owner(&params.user)?;

    if let Some(batch) = params.batch_size {
        if batch == 0 || batch > MAX_PAGE_LIMIT {
            return Err(ApiError::Validation(format!(
                "batch_size must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
    }
    if params.max_records == Some(0) {
        return Err(ApiError::Validation("max_records must be at least 1".to_string()));
    }

    let options = QueryOptions {
        sort_direction: parse_direction(params.sort_direction.as_deref())?,
        use_cache: params.use_cache.unwrap_or(true),
        exclude_deposits_withdrawals: params.exclude_deposits_withdrawals.unwrap_or(true),
    };

    let records = state
        .query
        .full_history(
            &params.user,
            params.batch_size,
            params.max_records,
            &options,
            &CancellationToken::new(),
        )
        .await?;

    let message = format!("fetched all {} activity records", records.len());
    Ok(Json(ActivityResponse {
        success: true,
        count: records.len(),
        data: records.into_iter().map(|r| r.payload).collect(),
        message: Some(message),
    }))
}

#[derive(Debug, Deserialize)]
struct StatsParams {
    user: Option<String>,
}

async fn cache_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Result<Json<Value>, ApiError> {
    if let Some(user) = &params.user {
        validate_owner(user)?;
    }

    let stats = state.query.cache_stats(params.user.as_deref()).await?;

    let mut body = serde_json::to_value(&stats).map_err(|e| {
        ApiError::Sync(SyncError::Store(e.into()))
    })?;

    // Human-readable renditions of the timestamp bounds
    if let Some(ts) = stats.oldest_timestamp {
        body["oldest_datetime"] = json!(format_timestamp(ts));
    }
    if let Some(ts) = stats.newest_timestamp {
        body["newest_datetime"] = json!(format_timestamp(ts));
    }

    Ok(Json(json!({
        "success": true,
        "stats": body,
    })))
}

#[derive(Debug, Deserialize)]
struct ClearParams {
    user: String,
}

async fn cache_clear(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Result<Json<Value>, ApiError> {
    validate_owner(&params.user)?;

    let removed = state.query.clear_cache(&params.user).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("cleared {} cached records for {}", removed, params.user),
    })))
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
