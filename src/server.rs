//! HTTP and WebSocket server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Index status plus query metrics |
//! | `GET`  | `/documents` | Per-document version and sync state |
//! | `POST` | `/ingest` | Scan the connector and enqueue every document |
//! | `POST` | `/query` | Permission-filtered answer with citations |
//! | `POST` | `/watcher/start` | Start watching the connector |
//! | `POST` | `/watcher/stop` | Stop watching |
//! | `GET`  | `/watcher/status` | Watcher state |
//! | `GET`  | `/ws` | Live pipeline events, snapshot first |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unknown_role` (400),
//! `watcher_error` (500), `internal` (500).
//!
//! # WebSocket frames
//!
//! Every frame is a JSON object with an `event` field and a `timestamp`.
//! The first frame is `{"event": "connected", "status": {...}}`; pipeline
//! events follow as they happen. The client may send `ping` (answered by
//! `pong`) or `status` (answered by a fresh status frame).

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use liveindex_core::models::{DocumentSummary, QueryResult, StatusSnapshot};

use crate::app::LiveIndex;
use crate::error::QueryError;
use crate::hub::HubMessage;
use crate::metrics::MetricsSnapshot;
use crate::query::QueryRequest;
use crate::sync::IngestReport;

#[derive(Clone)]
struct AppState {
    app: Arc<LiveIndex>,
}

/// Bind to `[server].bind` and serve until the process ends.
pub async fn run_server(app: Arc<LiveIndex>) -> anyhow::Result<()> {
    let bind_addr = app.config().server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("LiveIndex server listening on http://{}", bind_addr);
    axum::serve(listener, router(app)).await?;

    Ok(())
}

/// The full route table. Exposed for in-process testing.
pub fn router(app: Arc<LiveIndex>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/documents", get(handle_documents))
        .route("/ingest", post(handle_ingest))
        .route("/query", post(handle_query))
        .route("/watcher/start", post(handle_watcher_start))
        .route("/watcher/stop", post(handle_watcher_stop))
        .route("/watcher/status", get(handle_watcher_status))
        .route("/ws", get(handle_ws))
        .layer(cors)
        .with_state(AppState { app })
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

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let code = match err {
            QueryError::InvalidRequest(_) => "bad_request",
            QueryError::UnknownRole(_) => "unknown_role",
        };
        AppError {
            status: StatusCode::BAD_REQUEST,
            code,
            message: err.to_string(),
        }
    }
}

fn internal(code: &'static str, err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code,
        message: format!("{:#}", err),
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

// ============ GET /status ============

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    status: StatusSnapshot,
    metrics: MetricsSnapshot,
}

async fn handle_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.app.status(),
        metrics: state.app.metrics(),
    })
}

// ============ GET /documents ============

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentSummary>,
    count: usize,
}

async fn handle_documents(State(state): State<AppState>) -> Json<DocumentsResponse> {
    let documents = state.app.documents();
    Json(DocumentsResponse {
        count: documents.len(),
        documents,
    })
}

// ============ POST /ingest ============

#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
    #[serde(flatten)]
    report: IngestReport,
}

async fn handle_ingest(State(state): State<AppState>) -> Result<Json<IngestResponse>, AppError> {
    let report = state
        .app
        .ingest()
        .await
        .map_err(|e| internal("internal", e))?;
    Ok(Json(IngestResponse {
        status: "ok",
        report,
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryBody {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    /// Role name; takes precedence over `role_level`.
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    role_level: Option<u32>,
    #[serde(default)]
    document_id: Option<String>,
}

async fn handle_query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResult>, AppError> {
    let role = state
        .app
        .resolve_role(body.role.as_deref(), body.role_level)?;
    let request = QueryRequest {
        text: body.query,
        top_k: body.top_k,
        role,
        document_id: body.document_id,
    };
    Ok(Json(state.app.query(request).await?))
}

// ============ /watcher ============

#[derive(Serialize)]
struct WatcherResponse {
    status: &'static str,
    watcher_active: bool,
}

async fn handle_watcher_start(
    State(state): State<AppState>,
) -> Result<Json<WatcherResponse>, AppError> {
    let started = state
        .app
        .start_watcher()
        .map_err(|e| internal("watcher_error", e))?;
    Ok(Json(WatcherResponse {
        status: if started { "started" } else { "already_running" },
        watcher_active: state.app.watcher_active(),
    }))
}

async fn handle_watcher_stop(State(state): State<AppState>) -> Json<WatcherResponse> {
    let stopped = state.app.stop_watcher();
    Json(WatcherResponse {
        status: if stopped { "stopped" } else { "not_running" },
        watcher_active: state.app.watcher_active(),
    })
}

#[derive(Serialize)]
struct WatcherStatusResponse {
    running: bool,
    last_sync: Option<DateTime<Utc>>,
}

async fn handle_watcher_status(State(state): State<AppState>) -> Json<WatcherStatusResponse> {
    Json(WatcherStatusResponse {
        running: state.app.watcher_active(),
        last_sync: state.app.status().last_sync,
    })
}

// ============ GET /ws ============

async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| observe(socket, state.app))
}

async fn observe(mut socket: WebSocket, app: Arc<LiveIndex>) {
    let subscription = app.subscribe();
    tracing::info!(subscriber = subscription.id(), "websocket observer connected");

    loop {
        tokio::select! {
            msg = subscription.recv() => {
                let Some(msg) = msg else { break };
                if send_json(&mut socket, hub_frame(msg)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                let reply = match incoming {
                    Some(Ok(Message::Text(text))) => match text.as_str().trim() {
                        "ping" => serde_json::json!({ "event": "pong" }),
                        "status" => status_frame("status", &app.status()),
                        other => {
                            tracing::debug!(message = other, "ignoring websocket message");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => continue,
                };
                if send_json(&mut socket, reply).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(
        subscriber = subscription.id(),
        dropped = subscription.dropped(),
        "websocket observer disconnected"
    );
}

fn hub_frame(msg: HubMessage) -> serde_json::Value {
    match msg {
        HubMessage::Snapshot(status) => status_frame("connected", &status),
        HubMessage::Event(event) => serde_json::to_value(&event).unwrap_or_default(),
    }
}

fn status_frame(event: &str, status: &StatusSnapshot) -> serde_json::Value {
    serde_json::json!({ "event": event, "status": status })
}

async fn send_json(socket: &mut WebSocket, mut frame: serde_json::Value) -> Result<(), axum::Error> {
    if let Some(obj) = frame.as_object_mut() {
        obj.insert(
            "timestamp".to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );
    }
    socket.send(Message::Text(frame.to_string().into())).await
}
