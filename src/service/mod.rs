//! Follower Diff REST Service
//!
//! Exposes imports and follower history as a REST API.
//!
//! ## Endpoints
//!
//! - `POST /api/accounts/:account_id/imports?file_name=<name>` - Import an uploaded export (raw body)
//! - `GET /api/accounts/:account_id/imports` - List committed imports
//! - `GET /api/accounts/:account_id/events[?import_id=]` - List follow/unfollow events
//! - `GET /api/accounts/:account_id/followers` - List follower records
//! - `GET /api/accounts/:account_id/summary` - Overview counts
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{
    correlation_id, correlation_middleware, metrics_middleware, record_import_failure,
    record_import_metrics, REQUEST_ID_HEADER,
};
pub use routes::{create_router, import_error_response, AppState, ErrorResponse};
pub use state::{ServiceState, DEFAULT_MAX_UPLOAD_BYTES};
