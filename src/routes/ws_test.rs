use super::*;
use crate::config::EngineConfig;
use crate::protocol::NotificationLevel;
use crate::state::test_helpers;
use serde_json::json;
use tokio::time::{Duration, timeout};

async fn connect(state: &AppState) -> Connection {
    Connection::new(state.sessions.open().await)
}

async fn send(state: &AppState, conn: &mut Connection, value: serde_json::Value) -> Vec<ServerEvent> {
    process_inbound_text(state, conn, &value.to_string()).await
}

async fn recv_event(conn: &mut Connection) -> ServerEvent {
    timeout(Duration::from_millis(500), conn.next_event())
        .await
        .expect("event receive timed out")
        .expect("delivery queue closed unexpectedly")
}

fn drain(conn: &mut Connection) -> Vec<ServerEvent> {
    let Some(rx) = conn.events.as_mut() else {
        return Vec::new();
    };
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn kinds(events: &[ServerEvent]) -> Vec<&'static str> {
    events.iter().map(ServerEvent::kind).collect()
}

fn code(event: &ServerEvent) -> Option<&str> {
    match event {
        ServerEvent::Notification { code, .. } => code.as_deref(),
        _ => None,
    }
}

async fn joined(state: &AppState, room: &str, name: &str) -> Connection {
    let mut conn = connect(state).await;
    let replies = send(state, &mut conn, json!({"type": "join", "room_id": room, "display_name": name})).await;
    assert!(replies.is_empty(), "join failed: {replies:?}");
    let ServerEvent::SyncState(_) = recv_event(&mut conn).await else {
        panic!("expected sync_state after join");
    };
    conn
}

fn stroke_start(id: &str) -> serde_json::Value {
    json!({
        "type": "stroke_start",
        "stroke_id": id,
        "point": {"x": 0, "y": 0},
        "color": "#E53935",
        "width": 4,
        "tool": "pen"
    })
}

// =============================================================================
// parsing and binding
// =============================================================================

#[tokio::test]
async fn malformed_json_is_rejected_to_sender() {
    let state = test_helpers::test_app_state();
    let mut conn = connect(&state).await;
    let replies = process_inbound_text(&state, &mut conn, "{not json").await;
    assert_eq!(replies.len(), 1);
    assert_eq!(code(&replies[0]), Some("E_MALFORMED_MESSAGE"));
}

#[tokio::test]
async fn unknown_message_type_is_rejected() {
    let state = test_helpers::test_app_state();
    let mut conn = connect(&state).await;
    let replies = send(&state, &mut conn, json!({"type": "teleport"})).await;
    assert_eq!(code(&replies[0]), Some("E_MALFORMED_MESSAGE"));
}

#[tokio::test]
async fn room_commands_before_join_are_not_joined() {
    let state = test_helpers::test_app_state();
    let mut conn = connect(&state).await;
    for msg in [json!({"type": "undo"}), json!({"type": "leave"}), json!({"type": "sync"}), stroke_start("s1")] {
        let replies = send(&state, &mut conn, msg).await;
        assert_eq!(code(&replies[0]), Some("E_NOT_JOINED"));
    }
}

#[tokio::test]
async fn join_binds_session_and_delivers_snapshot() {
    let state = test_helpers::test_app_state();
    let conn = joined(&state, "studio", "ann").await;
    let binding = state.sessions.binding(conn.session_id).await.unwrap();
    assert_eq!(binding.room_id, "studio");
    assert_eq!(conn.binding, Some(binding));
}

#[tokio::test]
async fn join_full_room_reports_capacity_to_sender_only() {
    let config = EngineConfig { max_members: 1, ..EngineConfig::default() };
    let state = test_helpers::test_app_state_with(config);
    let mut first = joined(&state, "studio", "ann").await;

    let mut second = connect(&state).await;
    let replies = send(&state, &mut second, json!({"type": "join", "room_id": "studio", "display_name": "bob"})).await;
    assert_eq!(code(&replies[0]), Some("E_ROOM_FULL"));
    assert!(second.binding.is_none());
    assert!(drain(&mut first).is_empty());
}

// =============================================================================
// drawing
// =============================================================================

#[tokio::test]
async fn stroke_lifecycle_echoes_to_every_member_including_sender() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "studio", "ann").await;
    let mut bob = joined(&state, "studio", "bob").await;
    drain(&mut ann);

    assert!(send(&state, &mut ann, stroke_start("s1")).await.is_empty());
    send(
        &state,
        &mut ann,
        json!({"type": "stroke_update", "stroke_id": "s1", "points": [{"x": 1, "y": 1}, {"x": 2, "y": 2}]}),
    )
    .await;
    send(&state, &mut ann, json!({"type": "stroke_end", "stroke_id": "s1"})).await;

    let seen_ann = drain(&mut ann);
    let seen_bob = drain(&mut bob);
    assert_eq!(kinds(&seen_ann), vec!["stroke_started", "stroke_updated", "stroke_ended"]);
    assert_eq!(seen_ann, seen_bob);
}

#[tokio::test]
async fn invalid_stroke_is_rejected_without_broadcast() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "studio", "ann").await;
    let mut bob = joined(&state, "studio", "bob").await;
    drain(&mut ann);

    let mut bad = stroke_start("s1");
    bad["color"] = json!("");
    let replies = send(&state, &mut ann, bad).await;
    assert_eq!(code(&replies[0]), Some("E_VALIDATION"));
    assert!(drain(&mut ann).is_empty());
    assert!(drain(&mut bob).is_empty());
}

#[tokio::test]
async fn stale_update_is_invisible() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "studio", "ann").await;
    let replies = send(&state, &mut ann, json!({"type": "stroke_update", "stroke_id": "gone", "points": [{"x": 1, "y": 1}]})).await;
    assert!(replies.is_empty());
    assert!(drain(&mut ann).is_empty());
}

#[tokio::test]
async fn undo_with_empty_log_warns_sender() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "studio", "ann").await;
    let replies = send(&state, &mut ann, json!({"type": "undo"})).await;
    let [ServerEvent::Notification { level, code, .. }] = replies.as_slice() else {
        panic!("expected one notification, got {replies:?}");
    };
    assert_eq!(*level, NotificationLevel::Warning);
    assert_eq!(code.as_deref(), Some("E_NOTHING_TO_UNDO"));
}

#[tokio::test]
async fn cursor_move_reaches_peers() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "studio", "ann").await;
    let mut bob = joined(&state, "studio", "bob").await;
    drain(&mut ann);

    send(&state, &mut ann, json!({"type": "cursor_move", "x": 10.5, "y": 20, "drawing": true})).await;
    let ServerEvent::CursorMoved { cursor } = recv_event(&mut bob).await else {
        panic!("expected cursor_moved");
    };
    assert_eq!(Some(cursor.member_id), ann.binding.as_ref().map(|b| b.member_id));
    assert!(cursor.drawing);
}

#[tokio::test]
async fn sync_requests_fresh_snapshot() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "studio", "ann").await;
    send(&state, &mut ann, json!({"type": "sync"})).await;
    assert_eq!(kinds(&drain(&mut ann)), vec!["sync_state"]);
}

// =============================================================================
// sessions
// =============================================================================

#[tokio::test]
async fn save_session_replies_with_id_and_stores_export() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "studio", "ann").await;
    send(&state, &mut ann, stroke_start("s1")).await;
    send(&state, &mut ann, json!({"type": "stroke_end", "stroke_id": "s1"})).await;

    let replies = send(&state, &mut ann, json!({"type": "save_session"})).await;
    let [ServerEvent::SessionSaved { session_id }] = replies.as_slice() else {
        panic!("expected session_saved, got {replies:?}");
    };
    let saved = state.store.load(*session_id).await.unwrap();
    assert_eq!(saved.strokes.len(), 1);
    assert_eq!(saved.saved_by, "ann");
}

#[tokio::test]
async fn load_session_broadcasts_sync_state_and_notice() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "studio", "ann").await;
    send(&state, &mut ann, stroke_start("s1")).await;
    send(&state, &mut ann, json!({"type": "stroke_end", "stroke_id": "s1"})).await;
    let saved = state
        .rooms
        .export("studio", ann.binding.as_ref().unwrap().member_id)
        .await
        .unwrap();

    let mut bob = joined(&state, "other", "bob").await;
    let replies = send(&state, &mut bob, json!({"type": "load_session", "session": saved})).await;
    assert!(replies.is_empty(), "{replies:?}");
    let events = drain(&mut bob);
    assert_eq!(kinds(&events), vec!["sync_state", "notification"]);
    let ServerEvent::SyncState(snapshot) = &events[0] else {
        panic!("expected sync_state");
    };
    assert_eq!(snapshot.room_id, "other");
    assert_eq!(snapshot.strokes.len(), 1);
}

// =============================================================================
// leaving
// =============================================================================

#[tokio::test]
async fn leave_announces_departure_and_drops_queue() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "studio", "ann").await;
    let mut bob = joined(&state, "studio", "bob").await;
    drain(&mut ann);
    let bob_id = bob.binding.as_ref().unwrap().member_id;

    assert!(send(&state, &mut bob, json!({"type": "leave"})).await.is_empty());
    assert!(bob.binding.is_none());
    assert!(bob.events.is_none());
    assert!(state.sessions.binding(bob.session_id).await.is_none());

    let ServerEvent::MemberLeft { member_id, .. } = recv_event(&mut ann).await else {
        panic!("expected member_left");
    };
    assert_eq!(member_id, bob_id);
}

#[tokio::test]
async fn rejoin_other_room_parts_the_first() {
    let state = test_helpers::test_app_state();
    let mut ann = joined(&state, "one", "ann").await;
    send(&state, &mut ann, json!({"type": "join", "room_id": "two", "display_name": "ann"})).await;
    assert_eq!(ann.binding.as_ref().map(|b| b.room_id.as_str()), Some("two"));
    assert_eq!(state.rooms.room_count().await, 1);
    assert!(state.rooms.snapshot("one").await.is_none());
}

#[tokio::test]
async fn pruned_queue_ends_the_event_stream() {
    let config = EngineConfig { session_queue_capacity: 1, ..EngineConfig::default() };
    let state = test_helpers::test_app_state_with(config);
    let mut ann = joined(&state, "studio", "ann").await;
    let mut bob = connect(&state).await;
    send(&state, &mut bob, json!({"type": "join", "room_id": "studio", "display_name": "bob"})).await;
    assert_eq!(kinds(&drain(&mut ann)), vec!["member_joined"]);

    // Bob never reads; his single slot holds sync_state, so the next
    // broadcast prunes him.
    send(&state, &mut ann, json!({"type": "cursor_move", "x": 1, "y": 1})).await;
    drain(&mut ann);

    assert!(matches!(bob.next_event().await, Some(ServerEvent::SyncState(_))));
    assert!(bob.next_event().await.is_none());
}
