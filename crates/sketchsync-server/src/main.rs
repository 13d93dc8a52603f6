//! SketchSync collaboration server
//!
//! Holds the element list of every canvas and relays changes between the
//! clients joined to it.
//!
//! ## Protocol
//!
//! Messages are JSON with a `type` tag:
//! ```json
//! { "type": "join", "canvas_id": "board" }
//! { "type": "insert", "write_id": 1, "element": { ... } }
//! { "type": "cursor", "x": 100, "y": 200 }
//! ```
//! Every write is answered with `ack` or `rejected`. Accepted writes are
//! broadcast as `change` to all peers on the canvas, the writer included.

mod config;
mod connection;
mod rooms;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use config::{ConfigError, ServerConfig};
use connection::Connection;
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use rooms::{AppState, Envelope};
use serde::Serialize;
use sketchsync_core::sync::{ClientMessage, ServerMessage};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketchsync_server=info,tower_http=info".into()),
        )
        .init();

    if let Err(e) = run().await {
        error!("{}", e);
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::from_env()?;
    let state = Arc::new(AppState::new(&config));

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("SketchSync server listening on {}", config.addr);
    info!("WebSocket endpoint: ws://{}/ws", config.addr);
    if !config.auto_create {
        info!("Serving only configured canvases: {:?}", config.canvases);
    }

    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> &'static str {
    "SketchSync Server - Connect via WebSocket at /ws"
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    canvases: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        canvases: state.room_count(),
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize and send one message. Returns false if the socket is gone.
async fn send_message(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize {:?}: {}", message, e);
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

/// Send replies in order. Returns false if the socket is gone.
async fn send_all(sender: &mut SplitSink<WebSocket, Message>, messages: &[ServerMessage]) -> bool {
    for message in messages {
        if !send_message(sender, message).await {
            return false;
        }
    }
    true
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut conn = Connection::new(Uuid::new_v4().to_string());
    info!("New connection: {}", conn.peer_id());

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let replies = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => conn.handle_client_message(&state, client_msg),
                            Err(e) => {
                                warn!("Invalid message from {}: {}", conn.peer_id(), e);
                                vec![ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                }]
                            }
                        };
                        if !send_all(&mut sender, &replies).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Binary, ping and pong are not part of the protocol
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn.peer_id(), e);
                        break;
                    }
                }
            }

            envelope = async {
                match conn.receiver() {
                    Some(rx) => rx.recv().await,
                    // Not on a canvas yet
                    None => std::future::pending::<Result<Envelope, RecvError>>().await,
                }
            } => {
                match envelope {
                    Ok(envelope) => {
                        if conn.should_deliver(&envelope) && !send_message(&mut sender, &envelope.message).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Peer {} fell behind by {} messages", conn.peer_id(), skipped);
                        if !send_all(&mut sender, &conn.resync(&state)).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Room channel closed for {}", conn.peer_id());
                        conn.disconnect(&state);
                    }
                }
            }
        }
    }

    conn.disconnect(&state);
    info!("Connection closed: {}", conn.peer_id());
}
