//! HTTP server.
//!
//! Exposes ingestion, job status, search and entity retrieval as a JSON
//! HTTP API. Handlers share one [`IngestionPipeline`] and therefore one
//! snapshot store, so a search issued while ingestion runs reads the
//! previous snapshot until the new one is published.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/ingest` | Run ingestion over all configured sources |
//! | `GET`  | `/jobs` | Recent ingestion jobs, newest first |
//! | `GET`  | `/jobs/{id}` | One job's status |
//! | `POST` | `/search` | Ranked search over the current snapshot |
//! | `GET`  | `/entities/{id}` | One entity with its related entities |
//! | `GET`  | `/snapshot` | The whole snapshot without embedding vectors |
//!
//! # Error contract
//!
//! ```json
//! { "error": { "code": "snapshot_unavailable", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404),
//! `ingestion_running` (409), `internal` (500), `snapshot_unavailable` (503).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use knowledge_harness_core::models::JobStatusView;
use knowledge_harness_core::search::{search_store, RankingTable, SearchError, SearchRequest, SearchResult};
use knowledge_harness_core::snapshot::KnowledgeSnapshot;
use knowledge_harness_core::store::SnapshotStore;

use crate::config::Config;
use crate::embedding::create_provider;
use crate::export::without_embeddings;
use crate::get::{entity_response, EntityResponse};
use crate::ingest::{IngestError, IngestionPipeline};
use crate::sqlite_store::SqliteStore;
use crate::traits::ConnectorRegistry;

const DEFAULT_JOB_LIST_LIMIT: usize = 20;

/// Shared state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pipeline: Arc<IngestionPipeline>,
    pub connectors: Arc<ConnectorRegistry>,
    pub ranking: Arc<RankingTable>,
}

impl AppState {
    pub fn new(config: Config, pipeline: IngestionPipeline, connectors: ConnectorRegistry) -> Self {
        let ranking = config.ranking_table();
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            connectors: Arc::new(connectors),
            ranking: Arc::new(ranking),
        }
    }

    fn store(&self) -> &Arc<dyn SnapshotStore> {
        self.pipeline.store()
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .route("/jobs", get(handle_list_jobs))
        .route("/jobs/{id}", get(handle_get_job))
        .route("/search", post(handle_search))
        .route("/entities/{id}", get(handle_get_entity))
        .route("/snapshot", get(handle_snapshot))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` backed by the SQLite store.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let embedder = create_provider(&config.embedding)?;
    let pipeline = IngestionPipeline::new(store, embedder)
        .with_embed_timeout(Duration::from_secs(config.embedding.timeout_secs));
    let connectors = ConnectorRegistry::from_config(config);

    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), pipeline, connectors);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "knowledge server listening");
    println!("Knowledge server listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
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

/// Internal error type that converts into an Axum HTTP response.
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: impl std::fmt::Display) -> AppError {
    tracing::error!(error = %err, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: err.to_string(),
    }
}

fn unavailable() -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "snapshot_unavailable",
        message: SearchError::Unavailable.to_string(),
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::AlreadyRunning { .. } => AppError {
                status: StatusCode::CONFLICT,
                code: "ingestion_running",
                message: err.to_string(),
            },
            IngestError::Store(_) => internal(err),
        }
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Unavailable => unavailable(),
            SearchError::Store(_) => internal(err),
        }
    }
}

async fn current_snapshot(state: &AppState) -> Result<Arc<KnowledgeSnapshot>, AppError> {
    state
        .store()
        .load()
        .await
        .map_err(|e| internal(format!("{:#}", e)))?
        .ok_or_else(unavailable)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingest ============

/// Runs ingestion to completion and returns the job status.
///
/// A failed job is still a `200`: the failure is reported in the job. The
/// run is spawned so a client that disconnects does not cancel it halfway.
async fn handle_ingest(State(state): State<AppState>) -> Result<Json<JobStatusView>, AppError> {
    let pipeline = state.pipeline.clone();
    let connectors = state.connectors.clone();
    let job = tokio::spawn(async move { pipeline.run_connectors(&connectors).await })
        .await
        .map_err(internal)??;
    Ok(Json(job.status_view()))
}

// ============ GET /jobs ============

#[derive(Deserialize)]
struct JobListParams {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct JobListResponse {
    jobs: Vec<JobStatusView>,
}

async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListParams>,
) -> Result<Json<JobListResponse>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_JOB_LIST_LIMIT);
    if limit == 0 {
        return Err(bad_request("limit must be >= 1"));
    }
    let jobs = state
        .store()
        .list_jobs(limit)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(JobListResponse {
        jobs: jobs.iter().map(|j| j.status_view()).collect(),
    }))
}

// ============ GET /jobs/{id} ============

async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatusView>, AppError> {
    let job = state
        .store()
        .get_job(&id)
        .await
        .map_err(|e| internal(format!("{:#}", e)))?
        .ok_or_else(|| not_found(format!("job not found: {}", id)))?;
    Ok(Json(job.status_view()))
}

// ============ POST /search ============

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if request.limit == Some(0) {
        return Err(bad_request("limit must be >= 1"));
    }
    let results = search_store(
        state.store().as_ref(),
        &request,
        &state.ranking,
        state.config.retrieval.top_k,
    )
    .await?;
    Ok(Json(SearchResponse { results }))
}

// ============ GET /entities/{id} ============

async fn handle_get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EntityResponse>, AppError> {
    let snapshot = current_snapshot(&state).await?;
    entity_response(&snapshot, &id)
        .map(Json)
        .ok_or_else(|| not_found(format!("entity not found: {}", id)))
}

// ============ GET /snapshot ============

async fn handle_snapshot(State(state): State<AppState>) -> Result<Json<KnowledgeSnapshot>, AppError> {
    let snapshot = current_snapshot(&state).await?;
    Ok(Json(without_embeddings(&snapshot)))
}
