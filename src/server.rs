//! HTTP server: document upload and streaming chat.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart document upload, ingested synchronously |
//! | `GET`  | `/chat` | Server-sent-events chat stream |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Chat stream
//!
//! `GET /chat?message=...&session_id=...` answers one message. When no
//! `session_id` is supplied a fresh one is generated and announced first
//! as a `session` event, so the client can carry it into the next
//! request. Answer text follows as `data` events carrying
//! `{"token": "..."}` fragments, then an `end` event.
//!
//! The agent turn runs in a spawned task: if the client disconnects
//! mid-answer, generation stops but the turn still completes its session
//! save, persisting the partial answer.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support
//! browser-based clients.

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chat::ChatService;
use crate::config::Config;
use crate::ingest::IngestPipeline;

/// Answer deltas buffered between the agent task and the SSE stream.
const SSE_CHANNEL_CAPACITY: usize = 64;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    chat: Arc<ChatService>,
    ingest: Arc<IngestPipeline>,
    upload_dir: PathBuf,
}

/// Starts the HTTP server on the configured bind address. Runs until the
/// process is terminated.
pub async fn run_server(
    config: &Config,
    chat: Arc<ChatService>,
    ingest: Arc<IngestPipeline>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let upload_dir = PathBuf::from(&config.server.upload_dir);
    std::fs::create_dir_all(&upload_dir)?;

    let state = AppState {
        chat,
        ingest,
        upload_dir,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/upload", post(handle_upload))
        .route("/chat", get(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("docchat server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn ingest_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "ingest_error".to_string(),
        message: message.into(),
    }
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

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    files_received: usize,
    files_extracted: usize,
    chunks_indexed: usize,
}

/// Handler for `POST /upload`.
///
/// Accepts one or more files as multipart form fields, stages them under
/// the upload directory, and runs the ingestion pipeline over the batch.
/// Staged files are deleted afterwards whether or not ingestion
/// succeeded; the vector store is the system of record, not the upload
/// directory.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut staged = StagedUploads::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(String::from) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;

        // Prefix with a fresh id; the original name keeps its extension
        // so the extractor can dispatch on it.
        let safe_name = file_name.replace(['/', '\\'], "_");
        let path = state
            .upload_dir
            .join(format!("{}-{}", Uuid::new_v4(), safe_name));
        std::fs::write(&path, &bytes)
            .map_err(|e| ingest_error(format!("failed to stage upload: {}", e)))?;
        staged.paths.push(path);
    }

    if staged.paths.is_empty() {
        return Err(bad_request("no files in upload"));
    }

    info!(files = staged.paths.len(), "ingesting uploaded files");
    let report = state
        .ingest
        .ingest_files(&staged.paths)
        .await
        .map_err(|e| ingest_error(e.to_string()))?;
    Ok(Json(UploadResponse {
        files_received: report.files_seen,
        files_extracted: report.files_extracted,
        chunks_indexed: report.chunks_indexed,
    }))
}

/// Files staged for one upload batch, removed on drop. The vector store
/// is the system of record, so staged files never outlive the request,
/// whichever path it exits by.
#[derive(Default)]
struct StagedUploads {
    paths: Vec<PathBuf>,
}

impl Drop for StagedUploads {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(error = %e, path = %path.display(), "failed to remove staged upload");
            }
        }
    }
}

// ============ GET /chat ============

#[derive(Deserialize)]
struct ChatQuery {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// Handler for `GET /chat`.
async fn handle_chat(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let message = query.message;
    let announced = query.session_id.is_none();
    let session_id = query
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let stream = async_stream::stream! {
        if message.trim().is_empty() {
            yield Ok(Event::default().event("error").data("message must not be empty"));
            return;
        }

        if announced {
            yield Ok(Event::default().event("session").data(session_id.clone()));
        }

        let (tx, mut rx) = mpsc::channel::<String>(SSE_CHANNEL_CAPACITY);
        let chat = state.chat.clone();
        let task_session = session_id.clone();
        // Detached so the session save still happens if this stream is
        // dropped by a disconnecting client.
        let turn = tokio::spawn(async move {
            chat.run_turn(&task_session, &message, &tx).await;
        });

        while let Some(delta) = rx.recv().await {
            yield Ok(Event::default().data(
                serde_json::json!({ "token": delta }).to_string(),
            ));
        }

        if let Err(e) = turn.await {
            error!(error = %e, session_id, "chat turn task panicked");
            yield Ok(Event::default().event("error").data("internal error"));
            return;
        }
        yield Ok(Event::default().event("end").data(""));
    };

    Sse::new(stream)
}
