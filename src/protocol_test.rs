use super::*;
use serde_json::json;

#[test]
fn now_ms_is_positive() {
    assert!(now_ms() > 0);
}

// =============================================================================
// ClientMessage parsing
// =============================================================================

#[test]
fn parses_join() {
    let msg: ClientMessage =
        serde_json::from_value(json!({"type": "join", "room_id": "r1", "display_name": "Ann"})).unwrap();
    assert_eq!(msg, ClientMessage::Join { room_id: "r1".into(), display_name: "Ann".into() });
}

#[test]
fn parses_unit_variants() {
    for (raw, expected) in [
        ("undo", ClientMessage::Undo),
        ("redo", ClientMessage::Redo),
        ("clear", ClientMessage::Clear),
        ("sync", ClientMessage::Sync),
        ("leave", ClientMessage::Leave),
        ("save_session", ClientMessage::SaveSession),
    ] {
        let msg: ClientMessage = serde_json::from_value(json!({ "type": raw })).unwrap();
        assert_eq!(msg, expected);
    }
}

#[test]
fn stroke_start_defaults_optional_fields() {
    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "stroke_start",
        "point": {"x": 1, "y": 2},
        "color": "#ff0000",
        "width": 4,
        "tool": "pen"
    }))
    .unwrap();
    let ClientMessage::StrokeStart { stroke_id, filled, width, tool, .. } = msg else {
        panic!("expected stroke_start");
    };
    assert!(stroke_id.is_none());
    assert!(!filled);
    assert!((width - 4.0).abs() < f64::EPSILON);
    assert_eq!(tool, Tool::Pen);
}

#[test]
fn non_numeric_width_is_rejected_at_parse() {
    let result = serde_json::from_value::<ClientMessage>(json!({
        "type": "stroke_start",
        "point": {"x": 1, "y": 2},
        "color": "#ff0000",
        "width": "wide",
        "tool": "pen"
    }));
    assert!(result.is_err());
}

#[test]
fn unknown_type_is_rejected() {
    assert!(serde_json::from_value::<ClientMessage>(json!({"type": "explode"})).is_err());
}

#[test]
fn stroke_end_geometry_is_optional() {
    let msg: ClientMessage = serde_json::from_value(json!({"type": "stroke_end", "stroke_id": "s1"})).unwrap();
    assert_eq!(msg, ClientMessage::StrokeEnd { stroke_id: "s1".into(), geometry: None });

    let msg: ClientMessage = serde_json::from_value(json!({
        "type": "stroke_end",
        "stroke_id": "s1",
        "geometry": {"kind": "shape", "start": {"x": 0, "y": 0}, "end": {"x": 3, "y": 4}}
    }))
    .unwrap();
    let ClientMessage::StrokeEnd { geometry: Some(Geometry::Shape { end, .. }), .. } = msg else {
        panic!("expected shape geometry");
    };
    assert_eq!(end, Point::new(3.0, 4.0));
}

// =============================================================================
// ServerEvent encoding
// =============================================================================

#[test]
fn events_are_type_tagged() {
    let event = ServerEvent::MemberLeft { member_id: Uuid::nil(), discarded_strokes: vec!["s1".into()] };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "member_left");
    assert_eq!(json["discarded_strokes"][0], "s1");
    assert_eq!(event.kind(), "member_left");
}

#[test]
fn sync_state_flattens_snapshot() {
    let snapshot = RoomSnapshot {
        room_id: "r1".into(),
        strokes: vec![],
        active_strokes: vec![],
        members: vec![],
        cursors: vec![],
        operations: vec![],
        can_undo: false,
        can_redo: true,
    };
    let json = serde_json::to_value(ServerEvent::SyncState(snapshot.clone())).unwrap();
    assert_eq!(json["type"], "sync_state");
    assert_eq!(json["room_id"], "r1");
    assert_eq!(json["can_redo"], true);

    let restored: ServerEvent = serde_json::from_value(json).unwrap();
    assert_eq!(restored, ServerEvent::SyncState(snapshot));
}

#[test]
fn from_error_carries_code_and_level() {
    #[derive(Debug, thiserror::Error)]
    #[error("nothing here")]
    struct Missing;

    impl ErrorCode for Missing {
        fn error_code(&self) -> &'static str {
            "E_MISSING"
        }

        fn level(&self) -> NotificationLevel {
            NotificationLevel::Warning
        }
    }

    let event = ServerEvent::from_error(&Missing);
    assert_eq!(
        event,
        ServerEvent::Notification {
            message: "nothing here".into(),
            level: NotificationLevel::Warning,
            code: Some("E_MISSING".into()),
        }
    );
}

#[test]
fn plain_notification_omits_code() {
    let json = serde_json::to_value(ServerEvent::notification(NotificationLevel::Info, "hi")).unwrap();
    assert_eq!(json["level"], "info");
    assert!(json.get("code").is_none());
}
