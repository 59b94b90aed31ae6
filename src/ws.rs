//! Connection handler (C9): one session per WebSocket, decode → rate-limit →
//! dispatch, plus a writer task per joined player.
//!
//! `axum`'s WebSocket extractor supplies the upgrade and the split
//! sink/stream, the same shape as the pack's
//! `iflames1-stacks-wars-be/src/ws.rs` and `jofer86-archforge` — the one
//! place in this crate drawn straight from the pack rather than generalized
//! from the teacher, which has no transport layer of its own.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use crate::envelope::{ClientEnvelope, ServerEnvelope};
use crate::error::{JoinError, RoomError};
use crate::ratelimit::{RateDecision, RateLimiter};
use crate::room::Room;
use crate::room_manager::RoomManager;

/// Keepalive ping period; must stay well under the read-side dead-peer
/// window (§4.9: "ping every 30s, expect a response within 60s").
const PING_PERIOD: Duration = Duration::from_secs(30);
const READ_DEAD_PEER_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared process state handed to every route. The genre dictionary isn't
/// part of this state — it's a process-wide singleton (`genre::DICTIONARY`)
/// consulted directly wherever it's needed.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/room/{id}", get(room_snapshot))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn room_snapshot(
    axum::extract::Path(id): axum::extract::Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.rooms.get_room(&id) {
        Some(room) => Json(json!(room.http_snapshot().await)).into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection session state (§4.9).
struct Session {
    display_name: Option<String>,
    current_room: Option<Arc<Room>>,
    rate_limiter: RateLimiter,
    outbox: Option<mpsc::Receiver<ServerEnvelope>>,
    /// Set once the rate limiter has escalated to disconnection; the read
    /// loop checks this after every dispatched message and tears down,
    /// still running the standard leave sequence on the way out.
    disconnect_pending: bool,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerEnvelope>(32);

    let mut session = Session {
        display_name: None,
        current_room: None,
        rate_limiter: RateLimiter::new(),
        outbox: None,
        disconnect_pending: false,
    };

    loop {
        tokio::select! {
            biased;

            frame = tokio::time::timeout(READ_DEAD_PEER_TIMEOUT, stream.next()) => {
                match frame {
                    Err(_) => break, // dead-peer timeout
                    Ok(None) => break, // socket closed
                    Ok(Some(Err(_))) => break, // protocol-level read error
                    Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Ok(Message::Text(text)))) => {
                        if let Some(reply) = handle_text(&text, &mut session, &state, &direct_tx).await {
                            let _ = direct_tx.try_send(reply);
                        }
                        if session.disconnect_pending {
                            break;
                        }
                    }
                    Ok(Some(Ok(_))) => {} // ping/pong/binary: ignored
                }
            }

            Some(env) = direct_rx.recv() => {
                if send_envelope(&mut sink, &env).await.is_err() {
                    break;
                }
            }

            Some(env) = recv_from_outbox(&mut session.outbox) => {
                if send_envelope(&mut sink, &env).await.is_err() {
                    break;
                }
            }

            _ = tokio::time::sleep(PING_PERIOD) => {
                if send_envelope(&mut sink, &ServerEnvelope::Pong).await.is_err() {
                    break;
                }
            }
        }
    }

    leave_current_room(&mut session, &state).await;
}

async fn recv_from_outbox(outbox: &mut Option<mpsc::Receiver<ServerEnvelope>>) -> Option<ServerEnvelope> {
    match outbox {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_envelope(
    sink: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    env: &ServerEnvelope,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(env).unwrap_or_else(|_| "{}".to_string());
    sink.send(Message::Text(text.into())).await
}

impl Session {
    fn leave_room_state(&mut self) -> (Option<Arc<Room>>, Option<String>) {
        (self.current_room.take(), self.display_name.clone())
    }
}

async fn leave_current_room(session: &mut Session, state: &AppState) {
    let (room, name) = session.leave_room_state();
    if let (Some(room), Some(name)) = (room, name) {
        room.remove_player(&name).await;
        state.rooms.untrack_player(&name);
        room.broadcast(&ServerEnvelope::PlayerLeft { name }).await;
        room.broadcast(&room.player_list_envelope().await).await;
    }
    session.outbox = None;
}

/// Decodes, rate-limits, and dispatches one inbound text frame. Returns an
/// immediate reply to send back to *this* connection only, if any (most
/// handlers instead push broadcasts directly through the room).
async fn handle_text(
    text: &str,
    session: &mut Session,
    state: &AppState,
    direct_tx: &mpsc::Sender<ServerEnvelope>,
) -> Option<ServerEnvelope> {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(_) => {
            return Some(ServerEnvelope::Error {
                reason: "malformed message".to_string(),
            });
        }
    };

    let msg_type = client_type_name(&envelope);
    match session.rate_limiter.check(msg_type) {
        RateDecision::Allowed => {}
        RateDecision::Denied => {
            return Some(ServerEnvelope::Error {
                reason: "rate limit exceeded".to_string(),
            });
        }
        RateDecision::DenyDisconnect => {
            let _ = direct_tx.try_send(ServerEnvelope::Error {
                reason: "disconnected for repeated rate-limit violations".to_string(),
            });
            session.disconnect_pending = true;
            return None;
        }
    }

    dispatch(envelope, session, state, direct_tx).await
}

fn client_type_name(env: &ClientEnvelope) -> &'static str {
    match env {
        ClientEnvelope::GetRooms => "get_rooms",
        ClientEnvelope::GetGenres => "get_genres",
        ClientEnvelope::CreateRoom { .. } => "create_room",
        ClientEnvelope::Join { .. } => "join",
        ClientEnvelope::LeaveRoom => "leave_room",
        ClientEnvelope::StartGame { .. } => "start_game",
        ClientEnvelope::Answer { .. } => "answer",
        ClientEnvelope::Vote { .. } => "vote",
        ClientEnvelope::Challenge => "challenge",
        ClientEnvelope::Rebuttal { .. } => "rebuttal",
        ClientEnvelope::WithdrawChallenge => "withdraw_challenge",
        ClientEnvelope::Ping => "ping",
    }
}

async fn dispatch(
    envelope: ClientEnvelope,
    session: &mut Session,
    state: &AppState,
    direct_tx: &mpsc::Sender<ServerEnvelope>,
) -> Option<ServerEnvelope> {
    match envelope {
        ClientEnvelope::GetRooms => Some(ServerEnvelope::Rooms {
            rooms: state.rooms.list_rooms().await,
        }),
        ClientEnvelope::GetGenres => Some(ServerEnvelope::Genres {
            kana_rows: crate::kana::ROW_LABELS.iter().map(|&s| s.to_string()).collect(),
            genres: crate::genre::DICTIONARY
                .labels()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }),
        ClientEnvelope::CreateRoom { name, settings } => {
            leave_current_room(session, state).await;
            if !state.rooms.track_player(&name, "") {
                return Some(ServerEnvelope::Error {
                    reason: JoinError::NameTaken.to_string(),
                });
            }
            let room = state.rooms.create_room(&settings.name, &name, settings);
            state.rooms.untrack_player(&name);
            state.rooms.track_player(&name, &room.id);

            let (tx, rx) = mpsc::channel(256);
            if room.add_player(&name, tx).await.is_err() {
                state.rooms.untrack_player(&name);
                return Some(ServerEnvelope::Error {
                    reason: "failed to create room".to_string(),
                });
            }
            session.display_name = Some(name.clone());
            session.current_room = Some(Arc::clone(&room));
            session.outbox = Some(rx);

            let _ = direct_tx.try_send(room.joined_envelope(&name).await);
            room.broadcast(&room.player_list_envelope().await).await;
            None
        }
        ClientEnvelope::Join { name, room_id } => {
            let Some(room) = state.rooms.get_room(&room_id) else {
                return Some(ServerEnvelope::Error {
                    reason: JoinError::RoomNotFound.to_string(),
                });
            };
            if !state.rooms.track_player(&name, &room_id) {
                return Some(ServerEnvelope::Error {
                    reason: JoinError::NameTaken.to_string(),
                });
            }
            leave_current_room(session, state).await;

            let (tx, rx) = mpsc::channel(256);
            if let Err(e) = room.add_player(&name, tx).await {
                state.rooms.untrack_player(&name);
                return Some(ServerEnvelope::Error { reason: e.to_string() });
            }
            session.display_name = Some(name.clone());
            session.current_room = Some(Arc::clone(&room));
            session.outbox = Some(rx);

            let _ = direct_tx.try_send(room.joined_envelope(&name).await);
            room.broadcast(&ServerEnvelope::PlayerJoined { name: name.clone() }).await;
            room.broadcast(&room.player_list_envelope().await).await;
            if let Some(current_turn) = room.current_turn().await {
                room.broadcast(&ServerEnvelope::TurnUpdate { current_turn }).await;
            }
            None
        }
        ClientEnvelope::LeaveRoom => {
            leave_current_room(session, state).await;
            None
        }
        ClientEnvelope::StartGame { settings } => {
            with_room_and_name(session, |room, name| async move {
                match room.start_game(&name, settings).await {
                    Ok(()) => None,
                    Err(e) => Some(ServerEnvelope::Error { reason: e.to_string() }),
                }
            })
            .await
        }
        ClientEnvelope::Answer { word } => {
            with_room_and_name(session, |room, name| async move {
                room.submit_word(&name, &word).await;
                None
            })
            .await
        }
        ClientEnvelope::Vote { accept } => {
            with_room_and_name(session, |room, name| async move {
                room.cast_vote(&name, accept).await;
                None
            })
            .await
        }
        ClientEnvelope::Challenge => {
            with_room_and_name(session, |room, name| async move {
                match room.start_challenge_vote(&name).await {
                    Ok(()) => None,
                    Err(e) => Some(ServerEnvelope::Error { reason: e.to_string() }),
                }
            })
            .await
        }
        ClientEnvelope::Rebuttal { rebuttal } => {
            with_room_and_name(session, |room, name| async move {
                match room.rebuttal(&name, &rebuttal).await {
                    Ok(()) => None,
                    Err(e) => Some(ServerEnvelope::Error { reason: e.to_string() }),
                }
            })
            .await
        }
        ClientEnvelope::WithdrawChallenge => {
            with_room_and_name(session, |room, name| async move {
                if room.withdraw_challenge(&name).await {
                    None
                } else {
                    Some(ServerEnvelope::Error {
                        reason: RoomError::NoPendingVote.to_string(),
                    })
                }
            })
            .await
        }
        ClientEnvelope::Ping => Some(ServerEnvelope::Pong),
    }
}

/// Runs `f` against the session's current room and display name, returning
/// an `error` reply if the session hasn't joined a room yet.
async fn with_room_and_name<F, Fut>(session: &Session, f: F) -> Option<ServerEnvelope>
where
    F: FnOnce(Arc<Room>, String) -> Fut,
    Fut: std::future::Future<Output = Option<ServerEnvelope>>,
{
    match (&session.current_room, &session.display_name) {
        (Some(room), Some(name)) => f(Arc::clone(room), name.clone()).await,
        _ => Some(ServerEnvelope::Error {
            reason: "not currently in a room".to_string(),
        }),
    }
}
