//! Axum routes for the follower diff service.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Json, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::importer::{ImportError, ImportReport};
use crate::ingestor::FailureKind;
use crate::store::{FollowerStore, PostgresFollowerStore};
use crate::types::{AccountId, Event, FollowerRecord, FollowerSummary, ImportId, ImportRecord};

use super::middleware::{correlation_id, record_import_failure, record_import_metrics};
use super::state::ServiceState;

/// Type alias for the service state with PostgresFollowerStore.
pub type AppState = ServiceState<PostgresFollowerStore>;

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query string of an import request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportQuery {
    /// Name of the uploaded file; its extension selects archive or loose file.
    /// Required; a missing or blank name is a `MISSING_FILE_NAME` error.
    pub file_name: Option<String>,
}

/// Query string of an event listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsQuery {
    /// Restrict to one import.
    pub import_id: Option<String>,
}

/// Event listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventListResponse {
    /// Account the events belong to.
    pub account_id: AccountId,
    /// Import filter, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_id: Option<ImportId>,
    /// Events ordered by time, then identifier.
    pub events: Vec<Event>,
}

/// Follower listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerListResponse {
    /// Account the followers belong to.
    pub account_id: AccountId,
    /// Records ordered by identifier.
    pub followers: Vec<FollowerRecord>,
}

/// Import listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportListResponse {
    /// Account the imports belong to.
    pub account_id: AccountId,
    /// Imports, oldest first.
    pub imports: Vec<ImportRecord>,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Whether the follower store answered.
    pub store_connected: bool,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always `alive`.
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether traffic can be accepted.
    pub ready: bool,
    /// Whether the follower store answered.
    pub store: bool,
    /// Reason when not ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Structured error response with correlation ID for tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Correlation ID for request tracing (X-Cloud-Trace-Context, X-Request-Id or generated UUID).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            correlation_id: None,
            details: None,
        }
    }

    /// Add a correlation ID to the error.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Map an import failure to its status code and error body.
pub fn import_error_response(error: &ImportError) -> (StatusCode, ErrorResponse) {
    match error {
        ImportError::Ingest(e) => {
            let code = match e.kind() {
                FailureKind::NotFound => "EXPORT_NOT_FOUND",
                FailureKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
                FailureKind::MalformedInput => "MALFORMED_INPUT",
            };
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new(code, e.user_message()).with_details(e.to_string()),
            )
        }
        ImportError::Conflict => (
            StatusCode::CONFLICT,
            ErrorResponse::new("IMPORT_CONFLICT", error.to_string()),
        ),
        ImportError::Store(details) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorResponse::new("STORE_ERROR", "Failed to save the import").with_details(details.clone()),
        ),
    }
}

fn parse_account(raw: &str) -> Result<AccountId, ApiError> {
    AccountId::from_str(raw).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new("INVALID_ACCOUNT_ID", format!("Invalid account ID: {}", e))
                    .with_details(raw.to_string()),
            ),
        )
    })
}

fn store_error(error: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %error, "Store read failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("STORE_ERROR", "Failed to read from the store").with_details(error.to_string())),
    )
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Import one uploaded export for an account.
async fn import_handler<S: FollowerStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(account_id): Path<String>,
    Query(query): Query<ImportQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ImportReport>, ApiError> {
    let account = parse_account(&account_id)?;
    let file_name = query
        .file_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(
                    ErrorResponse::new(
                        "MISSING_FILE_NAME",
                        "The file_name query parameter is required",
                    )
                    .with_correlation_id(correlation_id(&headers)),
                ),
            )
        })?;
    let start = Instant::now();

    match state.importer.run(&account, &file_name, body.to_vec()).await {
        Ok(report) => {
            record_import_metrics(&report, start.elapsed().as_millis() as u64);
            Ok(Json(report))
        }
        Err(e) => {
            let (status, response) = import_error_response(&e);
            record_import_failure(&response.code);
            let response = response.with_correlation_id(correlation_id(&headers));
            tracing::warn!(
                account = %account,
                file_name = %file_name,
                code = %response.code,
                correlation_id = ?response.correlation_id,
                error = %e,
                "Import rejected"
            );
            Err((status, Json(response)))
        }
    }
}

/// List events of an account, optionally for one import.
async fn events_handler<S: FollowerStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(account_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventListResponse>, ApiError> {
    let account = parse_account(&account_id)?;
    let import_id = query
        .import_id
        .as_deref()
        .map(ImportId::from_str)
        .transpose()
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("INVALID_IMPORT_ID", format!("Invalid import ID: {}", e))),
            )
        })?;

    let events = state
        .store()
        .list_events(&account, import_id)
        .await
        .map_err(store_error)?;

    Ok(Json(EventListResponse {
        account_id: account,
        import_id,
        events,
    }))
}

/// List follower records of an account.
async fn followers_handler<S: FollowerStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(account_id): Path<String>,
) -> Result<Json<FollowerListResponse>, ApiError> {
    let account = parse_account(&account_id)?;
    let followers = state
        .store()
        .list_followers(&account)
        .await
        .map_err(store_error)?;

    Ok(Json(FollowerListResponse {
        account_id: account,
        followers,
    }))
}

/// List imports of an account.
async fn imports_handler<S: FollowerStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(account_id): Path<String>,
) -> Result<Json<ImportListResponse>, ApiError> {
    let account = parse_account(&account_id)?;
    let imports = state
        .store()
        .list_imports(&account)
        .await
        .map_err(store_error)?;

    Ok(Json(ImportListResponse {
        account_id: account,
        imports,
    }))
}

/// Overview counts of an account.
async fn summary_handler<S: FollowerStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
    Path(account_id): Path<String>,
) -> Result<Json<FollowerSummary>, ApiError> {
    let account = parse_account(&account_id)?;
    let summary = state.store().summary(&account).await.map_err(store_error)?;
    Ok(Json(summary))
}

/// Health check endpoint (detailed).
async fn health_handler<S: FollowerStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
) -> Json<HealthResponse> {
    let store_connected = state.store().is_healthy().await;

    Json(HealthResponse {
        status: if store_connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_connected,
    })
}

/// Liveness probe endpoint.
///
/// Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the store answers, 503 otherwise.
async fn readiness_handler<S: FollowerStore + 'static>(
    State(state): State<Arc<ServiceState<S>>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.store().is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            store: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                store: false,
                details: Some("Store connection failed".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the follower diff service.
pub fn create_router<S: FollowerStore + 'static>(state: ServiceState<S>) -> Router {
    let upload_limit = state.max_upload_bytes();
    let state = Arc::new(state);

    Router::new()
        // Imports
        .route(
            "/api/accounts/:account_id/imports",
            post(import_handler::<S>)
                .get(imports_handler::<S>)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        // History
        .route("/api/accounts/:account_id/events", get(events_handler::<S>))
        .route("/api/accounts/:account_id/followers", get(followers_handler::<S>))
        .route("/api/accounts/:account_id/summary", get(summary_handler::<S>))
        // Health checks
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .with_state(state)
}
