//! The API server: session creation, status queries, and the live
//! WebSocket stream for viewers.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use webpilot_agent::{Gateway, Orchestrator};
use webpilot_core::{Config, Paths};
use webpilot_store::{EventChannel, SessionStore};

#[derive(Clone)]
struct AppState {
    sessions: SessionStore,
    events: Arc<dyn EventChannel>,
    orchestrator: Arc<Orchestrator>,
}

pub async fn run(cli_host: Option<String>, cli_port: Option<u16>) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let runtime = super::build_runtime(&config, &paths)?;

    let state = AppState {
        sessions: runtime.sessions,
        events: runtime.events,
        orchestrator: runtime.orchestrator,
    };

    let app = Router::new()
        .route("/v1/health", get(handle_health))
        .route("/v1/sessions", post(handle_create_session))
        .route("/v1/sessions/:id", get(handle_get_session))
        .route("/v1/sessions/:id/ws", get(handle_ws_upgrade))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let host = cli_host.unwrap_or(config.gateway.host);
    let port = cli_port.unwrap_or(config.gateway.port);
    let addr = format!("{}:{}", host, port);

    info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    task: String,
}

/// Create the record, schedule exactly one orchestrator run for it, and
/// return immediately; progress is observed via the record or the stream.
async fn handle_create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    match state.sessions.create().await {
        Ok(session_id) => {
            let orchestrator = state.orchestrator.clone();
            let run_id = session_id.clone();
            tokio::spawn(async move {
                orchestrator.run_session(&run_id, &request.task).await;
            });
            (
                StatusCode::OK,
                Json(json!({"session_id": session_id, "status": "ready"})),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": e.to_string()})),
        )
            .into_response(),
    }
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.get(&session_id).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Session not found"})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": e.to_string()})),
        )
            .into_response(),
    }
}

async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, session_id))
}

/// Bridge one viewer socket to the session's channels. The socket side only
/// moves text frames; ordering and teardown live in [`Gateway::bridge`].
async fn handle_ws_connection(socket: WebSocket, state: AppState, session_id: String) {
    info!(session_id, "WebSocket client connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (to_client_tx, mut to_client_rx) = mpsc::channel::<String>(64);
    let (from_client_tx, from_client_rx) = mpsc::channel::<String>(64);

    let gateway = Gateway::new(state.events.clone());
    let bridge_id = session_id.clone();
    let bridge_task = tokio::spawn(async move {
        if let Err(e) = gateway.bridge(&bridge_id, to_client_tx, from_client_rx).await {
            warn!(session_id = %bridge_id, "Bridge error: {}", e);
        }
    });

    let send_task = tokio::spawn(async move {
        while let Some(msg) = to_client_rx.recv().await {
            if ws_sender.send(WsMessage::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                if from_client_tx.send(text).await.is_err() {
                    break;
                }
            }
            Ok(WsMessage::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    bridge_task.abort();
    send_task.abort();
    info!(session_id, "WebSocket client disconnected");
}
