//! WebSocket endpoint (Axum)
//!
//! One socket per user. Outbound events come from the connection
//! registry; inbound frames are client intents dispatched to the match
//! manager. Closing the socket implies leaving the queue and forfeiting
//! a live match.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::Error;
use crate::gaming::{ManagerStatsSnapshot, MatchManager, MatchSummary};
use crate::protocol::{MatchId, UserId};

use super::{ClientIntent, ConnectionRegistry, ServerEvent};

#[derive(Clone)]
struct AppState {
    manager: MatchManager,
    registry: Arc<ConnectionRegistry>,
}

/// Build the transport router: the WebSocket endpoint plus the status
/// endpoints reconnecting clients poll to resynchronize.
pub fn router(manager: MatchManager, registry: Arc<ConnectionRegistry>) -> Router {
    let state = AppState { manager, registry };
    Router::new()
        .route("/health", get(health))
        .route("/ws/:user_id", get(ws_connect))
        .route("/api/v1/matches/:id", get(get_match))
        .route("/api/v1/stats", get(get_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(
    manager: MatchManager,
    registry: Arc<ConnectionRegistry>,
    addr: SocketAddr,
) -> crate::error::Result<()> {
    let app = router(manager, registry);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Transport(format!("bind {} failed: {}", addr, e)))?;
    info!(%addr, "transport listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

async fn health() -> &'static str {
    "ok"
}

async fn get_match(
    State(state): State<AppState>,
    Path(id): Path<MatchId>,
) -> Result<Json<MatchSummary>, StatusCode> {
    match state.manager.match_summary(id).await {
        Some(summary) => Ok(Json(summary)),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn get_stats(State(state): State<AppState>) -> Json<ManagerStatsSnapshot> {
    Json(state.manager.stats().await)
}

async fn ws_connect(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: UserId) {
    info!(%user, "client connected");
    let (conn_id, mut events) = state.registry.register(user);
    let (mut sink, mut stream) = socket.split();

    // Writer: pump registry events into the socket
    let writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("failed to encode server event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    // Reader: dispatch intents until the socket closes
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientIntent>(&text) {
                Ok(intent) => dispatch(&state, user, intent).await,
                Err(e) => {
                    debug!(%user, "unparseable intent: {}", e);
                    state.registry.send(
                        user,
                        ServerEvent::Error {
                            code: "bad_request".into(),
                            message: format!("could not parse intent: {}", e),
                        },
                    );
                }
            },
            Message::Close(_) => break,
            // Axum answers pings itself
            _ => {}
        }
    }

    info!(%user, "client disconnected");
    writer.abort();
    // A stale socket (the user already reconnected) must not forfeit
    // the match the new connection is playing
    if state.registry.unregister(user, conn_id) {
        state.manager.handle_disconnect(user).await;
    }
}

/// Route one intent to the manager, reflecting failures back to the
/// submitting client with the specific reason.
async fn dispatch(state: &AppState, user: UserId, intent: ClientIntent) {
    let result = match intent {
        ClientIntent::JoinQueue {
            game_type,
            stake,
            currency_mode,
        } => {
            state
                .manager
                .join_queue(user, game_type, stake, currency_mode)
                .await
        }
        ClientIntent::CancelQueue => {
            state.manager.leave_queue(user).await;
            Ok(())
        }
        ClientIntent::MakeMove { match_id, mv } => {
            state.manager.make_move(user, match_id, mv).await
        }
        ClientIntent::Resign { match_id } => state.manager.resign(user, match_id).await,
        ClientIntent::ChatMessage { match_id, message } => {
            state.manager.chat(user, match_id, message).await
        }
    };

    if let Err(e) = result {
        state.registry.send(
            user,
            ServerEvent::Error {
                code: error_code(&e).into(),
                message: e.to_string(),
            },
        );
    }
}

/// Stable machine-readable codes so clients can react without parsing
/// messages
fn error_code(error: &Error) -> &'static str {
    match error {
        Error::Move(_) => "rejected_move",
        Error::InsufficientFunds(_) => "insufficient_funds",
        Error::MatchNotFound => "match_not_found",
        Error::PlayerNotInMatch => "not_in_match",
        Error::InvalidStake(_) => "invalid_stake",
        Error::Queue(_) => "queue_error",
        _ => "internal_error",
    }
}
