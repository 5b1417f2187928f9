//! The websocket transport: handshake, frame loop and the HTTP routes
//! around it.
//!
//! Identity is resolved before the socket enters the frame loop: a handoff
//! token wins over a session id, and a connection that resolves to nobody is
//! closed with code 4002. After the handshake a send task and a receive task
//! run until either side ends, and whichever finishes first aborts the
//! other.

use crate::app::App;
use crate::connections::{CLOSE_SESSION_INVALIDATED, ConnectionManager, PeerMessage};
use crate::identity::{PlayerDirectory, SessionStore};
use axum::Router;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chrono::Utc;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use hanafuda::ids::PlayerId;
use protocol::frames::{CommandFrame, CommandResponse, FrameProbe};
use protocol::ErrorCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// The routes of the runtime; the static fallback is added in `main`.
pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/auth/guest", post(guest_handler))
        .route("/handoff", get(handoff_handler))
        .route("/status", get(status_handler))
        .with_state(app)
}

#[derive(Debug, Deserialize)]
struct ConnectParams {
    session: Option<Uuid>,
    handoff: Option<String>,
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(app): State<Arc<App>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket(socket, app, params))
}

/// Handshake, then the full frame loop, then cleanup.
async fn websocket(socket: WebSocket, app: Arc<App>, params: ConnectParams) {
    let (mut sender, mut receiver) = socket.split();

    let Some(player_id) = authenticate(&app, &params).await else {
        close_unauthenticated(&mut sender).await;
        return;
    };

    let (tx, mut rx) = ConnectionManager::peer_channel();
    let peer_id = app.connections.register(player_id, tx.clone());
    tracing::debug!(player = %player_id, peer = %peer_id, "connection established");

    // Flag the seat as connected and resync a running game.
    app.session_service.handle_connect(player_id).await;

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let outcome = match message {
                PeerMessage::Event(event) => write_json(&mut sender, &event).await,
                PeerMessage::Response(response) => write_json(&mut sender, &response).await,
                PeerMessage::Close { code, reason } => {
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };
            if outcome.is_err() {
                break;
            }
        }
    });

    let frame_app = app.clone();
    let mut receive_task = tokio::spawn(async move {
        while let Some(message) = receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    handle_frame(&frame_app, player_id, text.as_str(), &tx).await;
                }
                Ok(Message::Close(_)) => break,
                // Pings and pongs are handled by the transport.
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }

    if let Some(player) = app.connections.remove(peer_id) {
        // Still the player's current connection: the seat goes dark and a
        // pending matchmaking entry is withdrawn.
        app.session_service.handle_disconnect(player).await;
        let _ = app.matchmaking.cancel(player);
        tracing::debug!(player = %player, peer = %peer_id, "connection closed");
    }
}

/// Resolves the connecting identity. A handoff token authorizes directly;
/// otherwise the session cookie value decides.
async fn authenticate(app: &App, params: &ConnectParams) -> Option<PlayerId> {
    if let (Some(token), Some(handoff)) = (&params.handoff, &app.handoff) {
        match handoff.verify(token, Utc::now()) {
            Ok((player_id, game_id)) => {
                tracing::debug!(player = %player_id, game = %game_id, "handoff token accepted");
                return Some(player_id);
            }
            Err(err) => {
                tracing::warn!(?err, "handoff token rejected");
                return None;
            }
        }
    }

    let session_id = params.session?;
    let player_id = app.session_store().resolve(session_id).await?;
    // The directory must still know the player.
    app.player_directory().get(player_id).await.map(|p| p.id)
}

async fn close_unauthenticated(sender: &mut SplitSink<WebSocket, Message>) {
    let _ = sender
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_SESSION_INVALIDATED,
            reason: "Session invalidated".into(),
        })))
        .await;
}

async fn write_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    value: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(value).expect("wire types always serialize");
    sender.send(Message::Text(json.into())).await
}

/// Parses and dispatches one inbound frame, writing the response back on
/// the peer channel.
async fn handle_frame(
    app: &App,
    player_id: PlayerId,
    text: &str,
    tx: &mpsc::Sender<PeerMessage>,
) {
    let response = match serde_json::from_str::<CommandFrame>(text) {
        Ok(frame) => app.session_service.dispatch(player_id, frame).await,
        Err(parse_err) => {
            // Recover the command id where possible so the client can still
            // correlate the rejection.
            let probe: Option<FrameProbe> = serde_json::from_str(text).ok();
            let command_id = probe
                .and_then(|p| p.command_id)
                .unwrap_or_else(|| "unknown".to_string());
            tracing::debug!(%parse_err, player = %player_id, "unparsable command frame");
            CommandResponse::fail(
                command_id,
                ErrorCode::UnknownCommand,
                "unrecognized or malformed command frame",
            )
        }
    };
    let _ = tx.send(PeerMessage::Response(response)).await;
}

#[derive(Debug, Deserialize)]
struct GuestRequest {
    display_name: String,
}

#[derive(Debug, Serialize)]
struct GuestResponse {
    player_id: PlayerId,
    session_id: Uuid,
    display_name: String,
}

/// Registers a guest identity and opens a session for it. Account flows
/// live outside this service; this is the minimal way in.
async fn guest_handler(
    State(app): State<Arc<App>>,
    axum::Json(request): axum::Json<GuestRequest>,
) -> impl IntoResponse {
    let player = app.player_directory().register_guest(&request.display_name).await;
    let session = app.session_store().create(player.id).await;
    tracing::info!(player = %player.id, "guest registered");
    axum::Json(GuestResponse {
        player_id: player.id,
        session_id: session.id,
        display_name: player.display_name,
    })
}

#[derive(Debug, Deserialize)]
struct HandoffRequest {
    session: Uuid,
}

/// Mints a handoff token for the caller's active game, for the transfer to
/// a game-serving instance.
async fn handoff_handler(
    State(app): State<Arc<App>>,
    Query(request): Query<HandoffRequest>,
) -> axum::response::Response {
    let Some(handoff) = app.handoff.as_ref() else {
        return (axum::http::StatusCode::NOT_FOUND, "handoff disabled").into_response();
    };
    let Some(player_id) = app.session_store().resolve(request.session).await else {
        return (axum::http::StatusCode::UNAUTHORIZED, "unknown session").into_response();
    };
    let Some(game) = app.store.find_active_for_player(player_id) else {
        return (axum::http::StatusCode::NOT_FOUND, "no active game").into_response();
    };
    let token = handoff.create(player_id, game.id, Utc::now());
    token.into_response()
}

/// One line of counters per live concern.
async fn status_handler(State(app): State<Arc<App>>) -> String {
    format!(
        "queued: {:03}  active games: {:03}  connections: {:03}  bot games: {:03}",
        app.pool.len(),
        app.store.active_count(),
        app.connections.connected_count(),
        app.ai.playing_count(),
    )
}
