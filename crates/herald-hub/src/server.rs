use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use herald_core::{ClearHistoryResponse, HistoryEntry};
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientId, ClientRegistry};
use crate::composer::{IdentityComposer, VariantComposer};
use crate::hub::Hub;
use crate::log::DEFAULT_HISTORY_LIMIT;

/// Server configuration.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
    pub history_limit: usize,
    /// Bearer token for `POST /api/clear-history`. `None` disables clearing.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            max_send_queue: 256,
            history_limit: DEFAULT_HISTORY_LIMIT,
            admin_token: None,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
    pub admin_token: Option<Arc<str>>,
    pub start_time: Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/history", get(history_handler))
        .route("/api/clear-history", post(clear_history_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start with the identity composer.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, std::io::Error> {
    start_with_composer(config, Box::new(IdentityComposer)).await
}

/// Create and start the server. Returns a handle that keeps it running.
pub async fn start_with_composer(
    config: ServerConfig,
    composer: Box<dyn VariantComposer>,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ClientRegistry::new(config.max_send_queue));
    let hub = Arc::new(Hub::new(Arc::clone(&registry), composer, config.history_limit));

    let cleanup = client::start_cleanup_task(
        Arc::clone(&registry),
        std::time::Duration::from_secs(60),
    );

    // All requests go through one processor so ids follow arrival order.
    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);
    let processor = tokio::spawn(process_messages(msg_rx, Arc::clone(&hub)));

    let state = AppState {
        hub: Arc::clone(&hub),
        message_tx: msg_tx,
        admin_token: config.admin_token.map(Arc::from),
        start_time: Instant::now(),
    };
    if state.admin_token.is_none() {
        tracing::warn!("no admin token configured, clearing history is disabled");
    }

    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), host = %config.host, "herald hub started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "hub server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        hub,
        server,
        processor,
        cleanup,
    })
}

/// Handle returned by `start()`. Dropping it leaves the tasks running;
/// call [`ServerHandle::shutdown`] to stop them.
pub struct ServerHandle {
    pub port: u16,
    hub: Arc<Hub>,
    server: tokio::task::JoinHandle<()>,
    processor: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    /// Wait until the server task ends.
    pub async fn wait(self) {
        let _ = self.server.await;
        self.processor.abort();
        self.cleanup.abort();
    }

    pub fn shutdown(self) {
        self.server.abort();
        self.processor.abort();
        self.cleanup.abort();
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let registry = Arc::clone(state.hub.registry());
    let (client_id, rx) = registry.register();
    tracing::info!(client_id = %client_id, "client connected");
    state.hub.greet(&client_id);

    client::handle_ws_connection(socket, client_id, rx, registry, state.message_tx).await;
}

/// GET /api/history, most recent first.
async fn history_handler(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.hub.history())
}

/// POST /api/clear-history
async fn clear_history_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<ClearHistoryResponse>) {
    if !authorized(&headers, state.admin_token.as_deref()) {
        tracing::warn!("unauthorized clear-history request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ClearHistoryResponse::refused("Unauthorized")),
        );
    }
    let removed = state.hub.clear();
    tracing::info!(removed, "announcement history cleared");
    (StatusCode::OK, Json(ClearHistoryResponse::cleared()))
}

fn authorized(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    announcements: usize,
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.hub.registry().count(),
        announcements: state.hub.announcement_count(),
    })
}

/// Process incoming frames from WebSocket clients, one at a time.
async fn process_messages(mut rx: mpsc::Receiver<(ClientId, String)>, hub: Arc<Hub>) {
    while let Some((client_id, raw)) = rx.recv().await {
        hub.handle_message(&client_id, &raw);
    }
}
