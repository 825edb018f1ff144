//! HTTP surface for the query pipeline.
//!
//! Exposes the orchestrator as a JSON API for the web client.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Run one query against an owned document |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Principal
//!
//! Session issuance and verification belong to the auth collaborator; by
//! the time a request reaches this server, a gateway has resolved the
//! session to a user id carried in the `x-user-id` header. A missing or
//! malformed header is rejected before the pipeline runs.
//!
//! # Error Contract
//!
//! All error responses use the envelope:
//!
//! ```json
//! { "error": { "code": "permission_denied", "message": "..." } }
//! ```
//!
//! Codes: `unauthorized` (401), `invalid_argument` (400), `not_found`
//! (404), `permission_denied` (403), `not_ready` (409),
//! `embedding_unavailable` / `search_unavailable` /
//! `generation_unavailable` (502), `cancelled` (408).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support the
//! browser-based study client.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db;
use crate::error::QueryError;
use crate::models::{QueryRequest, QueryResponse};
use crate::query::QueryOrchestrator;

/// Shared application state passed to route handlers.
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<QueryOrchestrator>,
    request_timeout: Duration,
}

/// Start the HTTP server on the configured bind address.
///
/// Builds the production pipeline from config and serves until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.db).await?;
    let orchestrator = QueryOrchestrator::from_config(config, pool)?;

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("tutor server listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error envelope.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

/// Map a pipeline error to its HTTP status, preserving the taxonomy's
/// client/upstream split.
fn classify_query_error(err: QueryError) -> AppError {
    let status = match &err {
        QueryError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        QueryError::NotFound(_) => StatusCode::NOT_FOUND,
        QueryError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        QueryError::NotReady(_) => StatusCode::CONFLICT,
        QueryError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        QueryError::EmbeddingUnavailable(_)
        | QueryError::SearchUnavailable(_)
        | QueryError::GenerationUnavailable(_) => StatusCode::BAD_GATEWAY,
    };

    AppError {
        status,
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Health check used by load balancers and monitoring.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /query ============

/// Run one query. The body is a [`QueryRequest`]; the principal comes
/// from the `x-user-id` header.
///
/// The pipeline runs under the configured request deadline: when it
/// expires, the in-flight external call is dropped and the request
/// reports `cancelled`.
async fn handle_query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| unauthorized("missing or malformed x-user-id header"))?;

    let result = tokio::time::timeout(state.request_timeout, state.orchestrator.query(&req, user_id))
        .await
        .unwrap_or(Err(QueryError::Cancelled));

    match result {
        Ok(response) => {
            println!(
                "query on document {} completed in {:.2}ms ({} sources)",
                req.document_id,
                response.time_taken_ms,
                response.sources.len()
            );
            Ok(Json(response))
        }
        Err(err) => {
            eprintln!("query on document {} failed: {}", req.document_id, err);
            Err(classify_query_error(err))
        }
    }
}
