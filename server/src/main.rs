use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use uuid::Uuid;

mod protocol;
mod state;

use protocol::{CreateRoomRequest, Frame};
use state::ServerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "premiere_server=debug,info".into()),
        )
        .init();

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(3005);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let app = Router::new()
        .route("/watch-party/create", post(create_room))
        .route("/watch-party/:code", get(get_room))
        .route("/watch-party/:code/close", post(close_room))
        .route("/ws", get(ws_endpoint))
        .route("/healthz", get(health_check))
        .with_state(ServerState::new());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Premiere server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

async fn create_room(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(request): Json<CreateRoomRequest>,
) -> impl IntoResponse {
    // Hosting requires a signed-in identity; guests join without one.
    if !headers.contains_key(axum::http::header::AUTHORIZATION) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let room = state.create_room(&request.host_name);
    Json(room).into_response()
}

async fn get_room(
    State(state): State<ServerState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    match state.get_room(&canonical(&code)) {
        Some(room) => Json(room).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn close_room(
    State(state): State<ServerState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    if state.close_room(&canonical(&code)) {
        "closed".into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Clients canonicalize codes before calling, but the invite URL path is
/// typed by hand often enough to normalize here too.
fn canonical(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

async fn ws_endpoint(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<ServerState>,
) -> impl IntoResponse {
    // The token only identifies; the relay carries no privileged operations.
    let authenticated = params.contains_key("token");
    ws.on_upgrade(move |socket| handle_connection(socket, state, authenticated))
}

async fn handle_connection(socket: WebSocket, state: ServerState, authenticated: bool) {
    let connection = Uuid::new_v4();
    tracing::info!(
        "relay connection {} established (authenticated: {})",
        connection,
        authenticated
    );

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();

    // Outbound task: everything the relay wants to send this connection.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("failed to serialize frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                if let Err(e) = handle_frame(&text, connection, &state, &tx) {
                    tracing::warn!("bad frame from {}: {}", connection, e);
                    let _ = tx.send(Frame::Error {
                        message: e.to_string(),
                    });
                }
            }
            Ok(WsMessage::Close(_)) => {
                tracing::info!("relay connection {} closing", connection);
                break;
            }
            Err(e) => {
                tracing::debug!("relay connection {} errored: {}", connection, e);
                break;
            }
            // Ping/pong handled at the protocol layer.
            _ => {}
        }
    }

    state.drop_connection(connection);
    send_task.abort();
    tracing::info!("relay connection {} cleaned up", connection);
}

fn handle_frame(
    text: &str,
    connection: Uuid,
    state: &ServerState,
    tx: &mpsc::UnboundedSender<Frame>,
) -> anyhow::Result<()> {
    let frame: Frame = serde_json::from_str(text)?;
    match frame {
        Frame::Subscribe { topic } => {
            state.subscribe(&topic, connection, tx.clone());
            let _ = tx.send(Frame::Subscribed { topic });
        }
        Frame::Unsubscribe { topic } => {
            state.unsubscribe(&topic, connection);
        }
        Frame::Publish { topic, body } => {
            state.publish(&topic, body);
        }
        other => {
            tracing::warn!("unexpected frame from {}: {:?}", connection, other);
        }
    }
    Ok(())
}
