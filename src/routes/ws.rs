//! WebSocket handler — one transport session per connection.
//!
//! DESIGN
//! ======
//! On upgrade, opens a session, sends `connected`, and enters a `select!`
//! loop:
//! - Incoming client messages → parse into `ClientMessage` → dispatch
//! - Room events from the session's delivery queue → forward to client
//!
//! Dispatch returns only the events addressed to the sender directly (errors
//! and `session_saved`). Everything a room commits reaches the sender
//! through its delivery queue, in the same order every other member sees.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `connected { session_id }`
//! 2. `join` → room admits the member, queue delivers `sync_state`
//! 3. Client messages → room commands → queue fan-out
//! 4. Close, `leave`, or queue pruned → leave the room → cleanup
//!
//! A pruned queue ends the connection. The client reconnects and the fresh
//! `sync_state` is its recovery path.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::ToolSettings;
use crate::protocol::{ClientMessage, ErrorCode, ServerEvent};
use crate::services::room::{Command, RoomError};
use crate::services::session::Binding;
use crate::state::AppState;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
enum GatewayError {
    #[error("invalid message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("binary frames are not supported")]
    Binary,
}

impl ErrorCode for GatewayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "E_MALFORMED_MESSAGE",
            Self::Binary => "E_BINARY_UNSUPPORTED",
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Per-connection state: the session id, the current room binding, and the
/// receiving half of the room's delivery queue.
struct Connection {
    session_id: Uuid,
    binding: Option<Binding>,
    events: Option<mpsc::Receiver<ServerEvent>>,
}

impl Connection {
    fn new(session_id: Uuid) -> Self {
        Self { session_id, binding: None, events: None }
    }

    /// Next queued room event. Pending forever while unbound; `None` once
    /// the room dropped this session's queue.
    async fn next_event(&mut self) -> Option<ServerEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }
}

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let session_id = state.sessions.open().await;
    let mut conn = Connection::new(session_id);

    if send_event(&mut socket, &ServerEvent::Connected { session_id })
        .await
        .is_ok()
    {
        info!(%session_id, "ws: client connected");
        serve(&mut socket, &state, &mut conn).await;
    }

    part(&state, &mut conn).await;
    state.sessions.close(session_id).await;
    info!(%session_id, "ws: client disconnected");
}

async fn serve(socket: &mut WebSocket, state: &AppState, conn: &mut Connection) {
    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let replies = match msg {
                    Message::Text(text) => process_inbound_text(state, conn, text.as_str()).await,
                    Message::Binary(_) => vec![ServerEvent::from_error(&GatewayError::Binary)],
                    Message::Close(_) => break,
                    _ => Vec::new(),
                };
                for event in &replies {
                    if send_event(socket, event).await.is_err() {
                        return;
                    }
                }
            }
            event = conn.next_event() => {
                let Some(event) = event else {
                    warn!(session_id = %conn.session_id, "ws: delivery queue closed, disconnecting");
                    break;
                };
                if send_event(socket, &event).await.is_err() {
                    break;
                }
            }
        }
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse and process one inbound text message and return the events for
/// the sender alone.
///
/// Kept apart from the socket so tests can drive the whole dispatch path
/// and read the delivery queue directly.
async fn process_inbound_text(state: &AppState, conn: &mut Connection, text: &str) -> Vec<ServerEvent> {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            let err = GatewayError::from(e);
            warn!(session_id = %conn.session_id, error = %err, "ws: invalid inbound message");
            return vec![ServerEvent::from_error(&err)];
        }
    };

    if msg.is_hot() {
        debug!(session_id = %conn.session_id, kind = msg.kind(), "ws: recv");
    } else {
        info!(session_id = %conn.session_id, kind = msg.kind(), "ws: recv");
    }

    match dispatch(state, conn, msg).await {
        Ok(replies) => replies,
        Err(event) => vec![event],
    }
}

async fn dispatch(state: &AppState, conn: &mut Connection, msg: ClientMessage) -> Result<Vec<ServerEvent>, ServerEvent> {
    let command = match msg {
        ClientMessage::Join { room_id, display_name } => {
            join(state, conn, room_id, &display_name).await?;
            return Ok(Vec::new());
        }
        ClientMessage::Leave => {
            if conn.binding.is_none() {
                return Err(ServerEvent::from_error(&RoomError::NotJoined));
            }
            part(state, conn).await;
            return Ok(Vec::new());
        }
        ClientMessage::SaveSession => return save_session(state, conn).await.map(|event| vec![event]),
        ClientMessage::StrokeStart { stroke_id, point, color, width, tool, filled } => Command::StrokeStart {
            stroke_id,
            point,
            settings: ToolSettings { tool, color, width, filled },
        },
        ClientMessage::StrokeUpdate { stroke_id, points } => Command::StrokeUpdate { stroke_id, points },
        ClientMessage::StrokeEnd { stroke_id, geometry } => Command::StrokeEnd { stroke_id, geometry },
        ClientMessage::StrokeErase { stroke_id } => Command::StrokeErase { stroke_id },
        ClientMessage::CursorMove { x, y, drawing } => {
            let binding = bound(conn)?;
            return state
                .rooms
                .update_cursor(&binding.room_id, binding.member_id, x, y, drawing)
                .await
                .map(|()| Vec::new())
                .map_err(|err| ServerEvent::from_error(&err));
        }
        ClientMessage::Undo => Command::Undo,
        ClientMessage::Redo => Command::Redo,
        ClientMessage::Clear => Command::Clear,
        ClientMessage::Sync => {
            let binding = bound(conn)?;
            return state
                .rooms
                .resync(&binding.room_id, binding.member_id)
                .await
                .map(|()| Vec::new())
                .map_err(|err| ServerEvent::from_error(&err));
        }
        ClientMessage::LoadSession { session } => Command::LoadSession { session },
    };

    let binding = bound(conn)?;
    state
        .rooms
        .apply(&binding.room_id, binding.member_id, command)
        .await
        .map(|()| Vec::new())
        .map_err(|err| ServerEvent::from_error(&err))
}

async fn join(state: &AppState, conn: &mut Connection, room_id: String, display_name: &str) -> Result<(), ServerEvent> {
    // Switching rooms leaves the current one first.
    part(state, conn).await;

    let (tx, rx) = state.sessions.delivery_queue();
    let admission = state
        .rooms
        .join(&room_id, display_name, tx)
        .await
        .map_err(|err| ServerEvent::from_error(&err))?;

    let binding = Binding { room_id, member_id: admission.member.id };
    state
        .sessions
        .bind(conn.session_id, binding.clone())
        .await;
    info!(
        session_id = %conn.session_id,
        room_id = %binding.room_id,
        member_id = %binding.member_id,
        "ws: joined room"
    );
    conn.binding = Some(binding);
    conn.events = Some(rx);
    Ok(())
}

/// Leave the bound room, if any. Drops the delivery queue.
async fn part(state: &AppState, conn: &mut Connection) {
    let Some(binding) = conn.binding.take() else {
        return;
    };
    conn.events = None;
    state.sessions.unbind(conn.session_id).await;
    if let Err(err) = state
        .rooms
        .leave(&binding.room_id, binding.member_id)
        .await
    {
        debug!(session_id = %conn.session_id, room_id = %binding.room_id, error = %err, "ws: leave skipped");
    }
}

async fn save_session(state: &AppState, conn: &Connection) -> Result<ServerEvent, ServerEvent> {
    let binding = bound(conn)?;
    let session = state
        .rooms
        .export(&binding.room_id, binding.member_id)
        .await
        .map_err(|err| ServerEvent::from_error(&err))?;
    state
        .store
        .save(&session)
        .await
        .map_err(|err| ServerEvent::from_error(&err))?;
    info!(
        session_id = %conn.session_id,
        room_id = %session.room_id,
        saved_session = %session.id,
        strokes = session.strokes.len(),
        "ws: session saved"
    );
    Ok(ServerEvent::SessionSaved { session_id: session.id })
}

// =============================================================================
// HELPERS
// =============================================================================

fn bound(conn: &Connection) -> Result<Binding, ServerEvent> {
    conn.binding
        .clone()
        .ok_or_else(|| ServerEvent::from_error(&RoomError::NotJoined))
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, kind = event.kind(), "ws: failed to serialize event");
            return Err(());
        }
    };
    if let ServerEvent::Notification { code: Some(code), message, .. } = event {
        warn!(code = %code, message = %message, "ws: send error notification");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
