use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::http;

use super::actor::{RelayCommand, RelayHandle, relay_actor};
use super::messages::{ClientMessage, ServerMessage};
use super::types::{ConnectionId, OutboundMessage, SignalingError};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct AppState {
    handle: RelayHandle,
    allowed_origins: Arc<Vec<String>>,
}

pub struct SignalingServer {
    handle: RelayHandle,
    config: ServerConfig,
}

impl SignalingServer {
    pub fn new(config: ServerConfig) -> Self {
        let (tx, rx) = mpsc::channel::<RelayCommand>(1024);
        tokio::spawn(relay_actor(rx));

        Self {
            handle: RelayHandle { tx },
            config,
        }
    }

    pub fn router(&self) -> Router {
        let cors = cors_layer(&self.config.allowed_origins);
        let state = AppState {
            handle: self.handle.clone(),
            allowed_origins: Arc::new(self.config.allowed_origins.clone()),
        };

        Router::new()
            .route("/", get(http::root))
            .route("/health", get(http::health))
            .route("/ws", get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(state)
    }

    pub async fn run(self, addr: &str) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling server listening on {}", addr);

        axum::serve(listener, self.router()).await
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unparseable allowed origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(origins)
}

/// Browser clients always send an Origin header on WebSocket connects;
/// those must be on the allow-list. Clients without one are let through.
fn origin_allowed(origin: &HeaderValue, allowed: &[String]) -> bool {
    origin
        .to_str()
        .map(|o| allowed.iter().any(|a| a == o))
        .unwrap_or(false)
}

async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN) {
        if !origin_allowed(origin, &state.allowed_origins) {
            warn!("Rejected WebSocket connect from origin {:?}", origin);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_connection(socket, state.handle))
}

async fn handle_connection(socket: WebSocket, handle: RelayHandle) {
    let conn_id = ConnectionId::generate();
    let (mut ws_tx, mut ws_rx) = socket.split();

    info!("WebSocket connection established: {}", conn_id);

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    handle.connect(conn_id, tx.clone()).await;

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.as_str().to_owned());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", conn_id);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Vec::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                debug!("Ping sent to {}", conn_id);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", conn_id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", conn_id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        if let Err(e) = handle_text_message(&text, conn_id, &tx, &handle).await {
                            warn!("Message handling error on {}: {}", conn_id, e);
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", conn_id);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", conn_id);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // Membership cleanup and user-left notification happen in the actor.
    handle.disconnect(conn_id).await;

    send_task.abort();
    info!("WebSocket disconnected: {}", conn_id);
}

async fn handle_text_message(
    text: &str,
    conn_id: ConnectionId,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &RelayHandle,
) -> Result<(), SignalingError> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            let err = ServerMessage::Error {
                message: format!("Invalid message: {}", e),
            };
            let _ = tx.send(OutboundMessage::from(serde_json::to_string(&err)?));
            return Ok(());
        }
    };

    match client_msg {
        ClientMessage::JoinRoom { room_id, email } => {
            handle.join(conn_id, room_id, email).await;
        }

        ClientMessage::Offer { to, offer } => {
            let relayed = ServerMessage::Offer {
                from: conn_id,
                offer,
            };
            handle
                .forward(to, OutboundMessage::from(serde_json::to_string(&relayed)?))
                .await;
        }

        ClientMessage::Answer { to, answer } => {
            let relayed = ServerMessage::Answer {
                from: conn_id,
                answer,
            };
            handle
                .forward(to, OutboundMessage::from(serde_json::to_string(&relayed)?))
                .await;
        }

        ClientMessage::IceCandidate { to, candidate } => {
            let relayed = ServerMessage::IceCandidate {
                from: conn_id,
                candidate,
            };
            handle
                .forward(to, OutboundMessage::from(serde_json::to_string(&relayed)?))
                .await;
        }

        ClientMessage::LeaveRoom { room_id } => {
            handle.leave(conn_id, room_id).await;
        }
    }

    Ok(())
}
