//! HTTP API.
//!
//! # Endpoints
//!
//! | Method   | Path                   | Description |
//! |----------|------------------------|-------------|
//! | `GET`    | `/health`              | Health check (returns version) |
//! | `GET`    | `/api/sync/status`     | Current sync status record |
//! | `POST`   | `/api/sync`            | Start a background sync run |
//! | `GET`    | `/api/search/semantic` | `?q=&k=` nearest documents |
//! | `GET`    | `/api/search`          | `?q=&limit=` substring search |
//! | `GET`    | `/api/notes`           | `?skip=&limit=` paged listing |
//! | `GET`    | `/api/notes/{id}`      | One document |
//! | `DELETE` | `/api/notes/{id}`      | Remove a document |
//! | `GET`    | `/api/stats`           | Store counts |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "search_unavailable", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `sync_in_progress` (409),
//! `embedding_failed` (502), `search_unavailable` (503), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

use crate::app::AppContext;
use crate::models::{Document, StoreStats};
use crate::query::QueryError;
use crate::status::{SyncStatus, SyncTriggerError};

/// Upper bound on `limit` for listing and lexical search.
const MAX_PAGE: i64 = 1000;
const DEFAULT_PAGE: i64 = 100;

/// Serve the API on `[server].bind` until the process is terminated.
pub async fn run_server(ctx: AppContext) -> anyhow::Result<()> {
    let bind_addr = ctx.config.server.bind.clone();
    let app = router(ctx)?;

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "HTTP server listening");
    println!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router. Fails only on an invalid CORS origin.
pub fn router(ctx: AppContext) -> anyhow::Result<Router> {
    let origin = match &ctx.config.server.cors_origin {
        Some(o) => AllowOrigin::exact(HeaderValue::from_str(o)?),
        None => AllowOrigin::from(Any),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any);

    Ok(Router::new()
        .route("/health", get(handle_health))
        .route("/api/sync/status", get(handle_sync_status))
        .route("/api/sync", post(handle_sync_trigger))
        .route("/api/search/semantic", get(handle_semantic_search))
        .route("/api/search", get(handle_lexical_search))
        .route("/api/notes", get(handle_list_notes))
        .route(
            "/api/notes/{id}",
            get(handle_get_note).delete(handle_delete_note),
        )
        .route("/api/stats", get(handle_stats))
        .layer(cors)
        .with_state(ctx))
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

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
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
    AppError::new(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::NOT_FOUND, "not_found", message)
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %format!("{:#}", err), "request failed");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::EmptyQuery => bad_request(err.to_string()),
            QueryError::SearchUnavailable => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, "search_unavailable", err.to_string())
            }
            QueryError::CannotEmbedQuery(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "embedding_failed", err.to_string())
            }
            QueryError::Internal(e) => e.into(),
        }
    }
}

impl From<SyncTriggerError> for AppError {
    fn from(err: SyncTriggerError) -> Self {
        AppError::new(StatusCode::CONFLICT, "sync_in_progress", err.to_string())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ Sync ============

async fn handle_sync_status(State(ctx): State<AppContext>) -> Json<SyncStatus> {
    Json(ctx.sync.status())
}

async fn handle_sync_trigger(
    State(ctx): State<AppContext>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    ctx.sync.trigger()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "started" })),
    ))
}

// ============ Search ============

#[derive(Deserialize)]
struct SemanticParams {
    #[serde(default)]
    q: String,
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<Document>,
}

async fn handle_semantic_search(
    State(ctx): State<AppContext>,
    Query(params): Query<SemanticParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let retrieval = &ctx.config.retrieval;
    let k = params.k.unwrap_or(retrieval.default_k);
    if k == 0 {
        return Err(bad_request("k must be >= 1"));
    }

    let results = ctx
        .query
        .semantic_search(&params.q, k.min(retrieval.max_k))
        .await?;
    Ok(Json(SearchResponse { results }))
}

#[derive(Deserialize)]
struct LexicalParams {
    #[serde(default)]
    q: String,
    limit: Option<i64>,
}

async fn handle_lexical_search(
    State(ctx): State<AppContext>,
    Query(params): Query<LexicalParams>,
) -> Result<Json<SearchResponse>, AppError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let limit = params
        .limit
        .unwrap_or(ctx.config.retrieval.lexical_limit)
        .clamp(1, MAX_PAGE);

    let results = ctx.query.lexical_search(&params.q, limit).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ Notes ============

#[derive(Deserialize)]
struct PageParams {
    #[serde(default)]
    skip: i64,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct NotesResponse {
    notes: Vec<Document>,
    skip: i64,
    limit: i64,
}

async fn handle_list_notes(
    State(ctx): State<AppContext>,
    Query(params): Query<PageParams>,
) -> Result<Json<NotesResponse>, AppError> {
    if params.skip < 0 {
        return Err(bad_request("skip must be >= 0"));
    }
    let limit = params.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);

    let notes = ctx.store.list_documents(params.skip, limit).await?;
    Ok(Json(NotesResponse {
        notes,
        skip: params.skip,
        limit,
    }))
}

async fn handle_get_note(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Document>, AppError> {
    ctx.store
        .get_document(&id)
        .await?
        .map(Json)
        .ok_or_else(|| not_found(format!("document not found: {}", id)))
}

async fn handle_delete_note(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if ctx.store.delete_document(&id).await? {
        info!(document_id = %id, "document deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("document not found: {}", id)))
    }
}

// ============ GET /api/stats ============

#[derive(Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    store: StoreStats,
    indexed_vectors: usize,
}

async fn handle_stats(State(ctx): State<AppContext>) -> Result<Json<StatsResponse>, AppError> {
    let store = ctx.store.stats().await?;
    Ok(Json(StatsResponse {
        store,
        indexed_vectors: ctx.index.len().await,
    }))
}
