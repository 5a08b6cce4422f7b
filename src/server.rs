//! HTTP API for the host chat runtime.
//!
//! The host's upload, settings-apply, and prompt-construction hooks call
//! these endpoints; everything routes through one shared
//! [`ContextManager`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check with store status |
//! | `POST` | `/files` | Stage files and add them to ephemeral context |
//! | `POST` | `/files/unstage` | Delete staged copies from one store's directory |
//! | `POST` | `/memorize` | Ingest session files (or the given files) into persistent context |
//! | `POST` | `/search` | Retrieve merged context for a query |
//! | `POST` | `/prompt` | Build the prompt with retrieved context spliced in |
//! | `GET`  | `/settings` | Current runtime settings |
//! | `PUT`  | `/settings` | Update chunk counts and/or the active routine |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_initialized", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `not_initialized` (409),
//! `not_implemented` (501), `unavailable` (503), `internal` (500).

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use habit_context_core::error::classify;
use habit_context_core::{ContextError, RetrievalResult};

use crate::ingest::IngestReport;
use crate::manager::{ContextManager, ContextStatus, StoreKind};
use crate::settings::{RoutineChange, Settings};

/// Build the router over a shared manager.
pub fn router(manager: Arc<ContextManager>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/files", post(handle_feed_files))
        .route("/files/unstage", post(handle_unstage))
        .route("/memorize", post(handle_memorize))
        .route("/search", post(handle_search))
        .route("/prompt", post(handle_prompt))
        .route("/settings", get(handle_get_settings).put(handle_put_settings))
        .layer(cors)
        .with_state(manager)
}

/// Serve the API on `[server].bind` until the process is terminated.
pub async fn run_server(manager: Arc<ContextManager>) -> anyhow::Result<()> {
    let bind_addr = manager.config().server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "context server listening");
    axum::serve(listener, router(manager)).await?;
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

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let (status, code) = match classify(&err) {
            Some(ContextError::NotFound { .. }) => (StatusCode::NOT_FOUND, "not_found"),
            Some(ContextError::NotInitialized(_)) => (StatusCode::CONFLICT, "not_initialized"),
            Some(ContextError::NotImplemented(_)) => {
                (StatusCode::NOT_IMPLEMENTED, "not_implemented")
            }
            Some(ContextError::Connectivity { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
            }
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!(error = %format!("{:#}", err), "request failed");
        }
        AppError {
            status,
            code,
            message: format!("{:#}", err),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    stores: ContextStatus,
}

async fn handle_health(
    State(manager): State<Arc<ContextManager>>,
) -> Result<Json<HealthResponse>, AppError> {
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        stores: manager.status().await?,
    }))
}

// ============ Files ============

#[derive(Deserialize)]
struct FilesRequest {
    files: Vec<PathBuf>,
}

async fn handle_feed_files(
    State(manager): State<Arc<ContextManager>>,
    Json(req): Json<FilesRequest>,
) -> Result<Json<IngestReport>, AppError> {
    Ok(Json(manager.feed_files(&req.files).await?))
}

#[derive(Deserialize)]
struct UnstageRequest {
    files: Vec<PathBuf>,
    #[serde(default = "default_store")]
    store: StoreKind,
}

fn default_store() -> StoreKind {
    StoreKind::Ephemeral
}

#[derive(Serialize)]
struct UnstageResponse {
    deleted: Vec<PathBuf>,
}

async fn handle_unstage(
    State(manager): State<Arc<ContextManager>>,
    Json(req): Json<UnstageRequest>,
) -> Result<Json<UnstageResponse>, AppError> {
    let deleted = manager.unstage(req.store, &req.files)?;
    Ok(Json(UnstageResponse { deleted }))
}

#[derive(Deserialize, Default)]
struct MemorizeRequest {
    #[serde(default)]
    files: Option<Vec<PathBuf>>,
}

async fn handle_memorize(
    State(manager): State<Arc<ContextManager>>,
    body: Option<Json<MemorizeRequest>>,
) -> Result<Json<IngestReport>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let report = match req.files {
        Some(files) => manager.memorize_files(&files).await?,
        None => manager.memorize().await?,
    };
    Ok(Json(report))
}

// ============ Retrieval ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
}

#[derive(Serialize)]
struct SearchResponse {
    results: RetrievalResult,
}

async fn handle_search(
    State(manager): State<Arc<ContextManager>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let results = manager.retrieve(&req.query).await?;
    Ok(Json(SearchResponse { results }))
}

#[derive(Deserialize)]
struct PromptRequest {
    input: String,
}

#[derive(Serialize)]
struct PromptResponse {
    prompt: String,
}

async fn handle_prompt(
    State(manager): State<Arc<ContextManager>>,
    Json(req): Json<PromptRequest>,
) -> Result<Json<PromptResponse>, AppError> {
    let prompt = manager.build_prompt(&req.input).await?;
    Ok(Json(PromptResponse { prompt }))
}

// ============ Settings ============

async fn handle_get_settings(State(manager): State<Arc<ContextManager>>) -> Json<Settings> {
    Json(manager.settings().await)
}

#[derive(Deserialize)]
struct SettingsRequest {
    ephemeral_chunks: Option<usize>,
    persistent_chunks: Option<usize>,
    active_routine: Option<String>,
}

#[derive(Serialize)]
struct SettingsResponse {
    settings: Settings,
    #[serde(skip_serializing_if = "Option::is_none")]
    routine: Option<RoutineChange>,
}

async fn handle_put_settings(
    State(manager): State<Arc<ContextManager>>,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<SettingsResponse>, AppError> {
    let (settings, routine) = manager
        .update_settings(
            req.ephemeral_chunks,
            req.persistent_chunks,
            req.active_routine.as_deref(),
        )
        .await
        .map_err(|e| bad_request(e.to_string()))?;
    Ok(Json(SettingsResponse { settings, routine }))
}
