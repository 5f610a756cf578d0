//! HTTP server for bulk edits.
//!
//! Uploads are parsed, computed and (for imports) applied against the
//! repository the server was started with.
//!
//! # API Endpoints
//!
//! | Method | Path                          | Description                          |
//! |--------|-------------------------------|--------------------------------------|
//! | GET    | `/health`                     | Health check                         |
//! | POST   | `/api/preview`                | Upload a document, report changes    |
//! | POST   | `/api/import?policy=`         | Upload a document, apply changes     |
//! | GET    | `/api/export?collection=`     | Current state as delimited text      |
//! | GET    | `/api/logs`                   | SSE stream for real-time logs        |

use axum::{
    extract::{Multipart, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{aborted_response, error_response, BatchResponse};
use crate::config::BulkEditConfig;
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::parser::{load_bytes, WorkbookOptions};
use crate::reconcile::{run_import, BatchPolicy, ImportOptions};
use crate::report::export_collection;
use crate::store::MemoryRepository;

type ApiError = (StatusCode, Json<Value>);

/// Shared server state.
pub struct AppState {
    pub repo: Mutex<MemoryRepository>,
    pub config: BulkEditConfig,
}

impl AppState {
    pub fn new(repo: MemoryRepository, config: BulkEditConfig) -> Self {
        Self {
            repo: Mutex::new(repo),
            config,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    /// `stop` or `continue` (default)
    pub policy: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub collection: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/preview", post(preview))
        .route("/api/import", post(import))
        .route("/api/export", get(export))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(
    port: u16,
    repo: MemoryRepository,
    config: BulkEditConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(Arc::new(AppState::new(repo, config)));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    eprintln!("🚀 Bulk edit server running on http://localhost:{}", port);
    eprintln!("   POST /api/preview - Preview a CSV or workbook");
    eprintln!("   POST /api/import  - Apply a CSV or workbook");
    eprintln!("   GET  /api/export  - Export current state");
    eprintln!("   GET  /api/logs    - SSE log stream");
    eprintln!("   GET  /health      - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "bulkedit",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "preview": "POST /api/preview",
            "import": "POST /api/import?policy=stop|continue",
            "export": "GET /api/export?collection=",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn preview(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<BatchResponse>, ApiError> {
    let (file_name, bytes) = read_upload(multipart).await?;
    process_upload(&state, file_name, &bytes, &ImportOptions::preview()).map(Json)
}

async fn import(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImportQuery>,
    multipart: Multipart,
) -> Result<Json<BatchResponse>, ApiError> {
    let policy = parse_policy(query.policy.as_deref())?;
    let (file_name, bytes) = read_upload(multipart).await?;
    process_upload(&state, file_name, &bytes, &ImportOptions::commit(policy)).map(Json)
}

async fn export(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let repo = lock(&state)?;
    let csv = export_collection(&*repo, query.collection.as_deref(), &state.config)
        .map_err(|e| api_error(e.into()))?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response())
}

fn parse_policy(raw: Option<&str>) -> Result<BatchPolicy, ApiError> {
    match raw.map(str::to_lowercase).as_deref() {
        None | Some("continue") => Ok(BatchPolicy::Continue),
        Some("stop") => Ok(BatchPolicy::StopOnError),
        Some(other) => Err(api_error(ServerError::BadRequest(format!(
            "Unknown policy '{}'",
            other
        )))),
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<(Option<String>, Vec<u8>), ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(ServerError::BadRequest(format!("Multipart error: {}", e))))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| api_error(ServerError::BadRequest(format!("Read error: {}", e))))?;
            file_data = Some(bytes.to_vec());
        }
    }

    let bytes = file_data
        .ok_or_else(|| api_error(ServerError::BadRequest("No file provided".into())))?;
    Ok((file_name, bytes))
}

/// Parse, compute and optionally apply one uploaded document.
pub fn process_upload(
    state: &AppState,
    file_name: Option<String>,
    bytes: &[u8],
    options: &ImportOptions,
) -> Result<BatchResponse, ApiError> {
    log_info(format!(
        "📄 Upload: {} ({} bytes)",
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    run_upload(state, file_name, bytes, options).map_err(api_error)
}

fn run_upload(
    state: &AppState,
    file_name: Option<String>,
    bytes: &[u8],
    options: &ImportOptions,
) -> ServerResult<BatchResponse> {
    let mut repo = state
        .repo
        .lock()
        .map_err(|_| ServerError::Internal("Repository lock poisoned".into()))?;
    let document = load_bytes(
        bytes,
        file_name.as_deref(),
        &state.config,
        &*repo,
        &WorkbookOptions::default(),
    )?;

    let batch = run_import(&mut *repo, &document, &state.config, options)?;
    Ok(BatchResponse::new(file_name, &document, &batch, &state.config))
}

fn lock(state: &AppState) -> Result<std::sync::MutexGuard<'_, MemoryRepository>, ApiError> {
    state
        .repo
        .lock()
        .map_err(|_| api_error(ServerError::Internal("Repository lock poisoned".into())))
}

fn api_error(err: ServerError) -> ApiError {
    match err {
        ServerError::Pipeline(PipelineError::Aborted(failure)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(aborted_response(failure.row, failure.sheet.as_deref(), &failure.message)),
        ),
        ServerError::Pipeline(PipelineError::Csv(_) | PipelineError::Config(_))
        | ServerError::BadRequest(_) => {
            (StatusCode::BAD_REQUEST, Json(error_response(&err.to_string())))
        }
        ServerError::Pipeline(PipelineError::Store(_)) | ServerError::Internal(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_response(&err.to_string())),
        ),
    }
}
