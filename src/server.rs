//! HTTP API for the agent service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/analyze` | Analyze one event (`{event_id, force?}`) |
//! | `GET`  | `/api/v1/analyses?limit=` | Most recent analyses joined with their events |
//! | `GET`  | `/api/v1/events?limit=&acknowledged=` | Most recent events |
//! | `POST` | `/api/v1/events/{id}/acknowledge?operator=` | Operator acknowledgement |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Event 42 not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//! A failed analysis is not an error: it is a `200` with `status = "failed"`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so dashboards can call
//! the API directly.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::analyze::{AnalyzeError, AnalyzeRequest, Analyzer};
use crate::config::Config;
use crate::embedding::OllamaEmbedder;
use crate::events;
use crate::ingest::Ingestor;
use crate::models::{AnalysisRecord, AnalysisSummary, Event};
use crate::store::SqliteStore;

const MAX_EVENT_LIMIT: i64 = 100;

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub analyzer: Arc<Analyzer>,
}

/// Build the router without binding, so tests can serve it on any listener.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/analyze", post(handle_analyze))
        .route("/api/v1/analyses", get(handle_recent_analyses))
        .route("/api/v1/events", get(handle_list_events))
        .route(
            "/api/v1/events/{id}/acknowledge",
            post(handle_acknowledge).get(handle_acknowledge),
        )
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bootstrap the knowledge base if it is empty, then serve until the
/// process is terminated.
pub async fn run_server(config: &Config, pool: SqlitePool) -> anyhow::Result<()> {
    let embedder = Arc::new(OllamaEmbedder::new(&config.embedding)?);
    let store = Arc::new(SqliteStore::new(pool.clone(), config.embedding.dims));
    let ingestor = Ingestor::new(config, embedder, store)?;
    if let Err(e) = ingestor.ingest_if_empty(&config.knowledge.dir).await {
        warn!(error = %e, "knowledge bootstrap failed, serving without documentation");
    }

    let state = AppState {
        pool: pool.clone(),
        analyzer: Arc::new(Analyzer::from_config(config, pool)?),
    };

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "agent API listening");
    println!("Agent API listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Handlers ============

async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisRecord>, AppError> {
    let record = state.analyzer.analyze(request).await?;
    Ok(Json(record))
}

#[derive(Deserialize)]
struct AnalysesQuery {
    #[serde(default = "default_analyses_limit")]
    limit: i64,
}

fn default_analyses_limit() -> i64 {
    10
}

async fn handle_recent_analyses(
    State(state): State<AppState>,
    Query(query): Query<AnalysesQuery>,
) -> Result<Json<Vec<AnalysisSummary>>, AppError> {
    if query.limit < 1 {
        return Err(bad_request("limit must be at least 1"));
    }
    let rows = events::recent_analyses(&state.pool, query.limit)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
struct EventsQuery {
    #[serde(default = "default_events_limit")]
    limit: i64,
    acknowledged: Option<bool>,
}

fn default_events_limit() -> i64 {
    20
}

async fn handle_list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    if !(1..=MAX_EVENT_LIMIT).contains(&query.limit) {
        return Err(bad_request(format!(
            "limit must be between 1 and {}",
            MAX_EVENT_LIMIT
        )));
    }
    let rows = events::list_events(&state.pool, query.limit, query.acknowledged)
        .await
        .map_err(internal)?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
struct AcknowledgeQuery {
    #[serde(default = "default_operator")]
    operator: String,
}

fn default_operator() -> String {
    "unknown".to_string()
}

#[derive(Serialize)]
struct AcknowledgeResponse {
    message: &'static str,
    event_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    operator: Option<String>,
}

async fn handle_acknowledge(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Query(query): Query<AcknowledgeQuery>,
) -> Result<Json<AcknowledgeResponse>, AppError> {
    let updated = events::acknowledge_event(&state.pool, event_id, &query.operator)
        .await
        .map_err(internal)?;

    Ok(Json(if updated {
        AcknowledgeResponse {
            message: "Event acknowledged",
            event_id,
            operator: Some(query.operator),
        }
    } else {
        AcknowledgeResponse {
            message: "Event not found or already acknowledged",
            event_id,
            operator: None,
        }
    }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "maritime-agent",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AnalyzeError> for AppError {
    fn from(err: AnalyzeError) -> Self {
        match err {
            AnalyzeError::EventNotFound(_) => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: err.to_string(),
            },
            AnalyzeError::Storage(_) => internal(err),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn internal(err: impl std::fmt::Display) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}
