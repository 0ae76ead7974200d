use super::*;
use crate::model::{Point, Tool, ToolSettings};
use crate::services::registry::RoomRegistry;
use crate::services::room::{Command, RoomLimits};
use tokio::sync::mpsc;

fn registry() -> RoomRegistry {
    RoomRegistry::new(RoomLimits { max_members: 8, operation_log_cap: 100, max_stroke_points: 1000 })
}

fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn start(id: &str, tool: Tool) -> Command {
    Command::StrokeStart {
        stroke_id: Some(id.into()),
        point: Point::new(0.0, 0.0),
        settings: ToolSettings { tool, color: "#000".into(), width: 2.0, filled: false },
    }
}

fn update(id: &str, x: f64) -> Command {
    Command::StrokeUpdate { stroke_id: id.into(), points: vec![Point::new(x, x)] }
}

fn end(id: &str) -> Command {
    Command::StrokeEnd { stroke_id: id.into(), geometry: None }
}

/// Replay `events` on top of the view seeded by the first `sync_state`.
fn replay(events: &[ServerEvent]) -> CanvasView {
    let Some(ServerEvent::SyncState(snapshot)) = events.first() else {
        panic!("event stream must start with sync_state");
    };
    let mut view = CanvasView::from_snapshot(snapshot);
    for event in &events[1..] {
        view.apply(event);
    }
    view
}

#[tokio::test]
async fn incremental_view_matches_fresh_snapshot() {
    let rooms = registry();
    let (obs_tx, mut obs_rx) = mpsc::channel(256);
    let (a_tx, _a_rx) = mpsc::channel(256);
    let (b_tx, _b_rx) = mpsc::channel(256);

    rooms.join("studio", "observer", obs_tx).await.unwrap();
    let a = rooms.join("studio", "ann", a_tx).await.unwrap().member;
    let b = rooms.join("studio", "bob", b_tx).await.unwrap().member;

    let script = vec![
        (a.id, start("s1", Tool::Pen)),
        (a.id, update("s1", 1.0)),
        (b.id, start("r1", Tool::Rectangle)),
        (b.id, update("r1", 5.0)),
        (a.id, update("s1", 2.0)),
        (a.id, end("s1")),
        (b.id, end("r1")),
        (a.id, Command::CursorMove { x: 3.0, y: 4.0, drawing: false }),
        (b.id, Command::StrokeErase { stroke_id: "s1".into() }),
        (a.id, Command::Undo),
        (a.id, start("s2", Tool::Marker)),
        (a.id, end("s2")),
        (b.id, start("wip", Tool::Pen)),
        (b.id, Command::Clear),
        (a.id, Command::Undo),
        (b.id, Command::Redo),
        (b.id, Command::Undo),
        (a.id, start("left", Tool::Pen)),
    ];
    for (member, command) in script {
        rooms.apply("studio", member, command).await.unwrap();
    }
    rooms.leave("studio", a.id).await.unwrap();

    let events = drain(&mut obs_rx);
    let view = replay(&events);
    let snapshot = rooms.snapshot("studio").await.unwrap();
    assert!(view.matches(&snapshot), "view {view:#?}\nsnapshot {snapshot:#?}");
    assert!(view.member(a.id).is_none());
    assert!(view.active_strokes.is_empty());
    assert_eq!(view.strokes.len(), 3);
}

#[tokio::test]
async fn late_joiner_and_early_joiner_converge() {
    let rooms = registry();
    let (early_tx, mut early_rx) = mpsc::channel(256);
    let a = rooms.join("studio", "early", early_tx).await.unwrap().member;

    for id in ["a", "b", "c"] {
        rooms.apply("studio", a.id, start(id, Tool::Pen)).await.unwrap();
        rooms.apply("studio", a.id, end(id)).await.unwrap();
    }
    rooms.apply("studio", a.id, Command::Undo).await.unwrap();

    let (late_tx, mut late_rx) = mpsc::channel(256);
    rooms.join("studio", "late", late_tx).await.unwrap();
    rooms.apply("studio", a.id, Command::Redo).await.unwrap();
    rooms
        .apply("studio", a.id, Command::StrokeErase { stroke_id: "b".into() })
        .await
        .unwrap();

    let early = replay(&drain(&mut early_rx));
    let late = replay(&drain(&mut late_rx));
    assert_eq!(early, late);
    let ids: Vec<&str> = early.strokes.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
}

#[test]
fn update_for_unknown_stroke_is_ignored() {
    let mut view = CanvasView::default();
    view.apply(&ServerEvent::StrokeUpdated { stroke_id: "ghost".into(), points: vec![Point::new(1.0, 1.0)] });
    assert_eq!(view, CanvasView::default());
}

#[test]
fn sync_state_replaces_everything() {
    let mut view = CanvasView { can_undo: true, ..CanvasView::default() };
    let snapshot = RoomSnapshot {
        room_id: "r".into(),
        strokes: Vec::new(),
        active_strokes: Vec::new(),
        members: Vec::new(),
        cursors: Vec::new(),
        operations: Vec::new(),
        can_undo: false,
        can_redo: false,
    };
    view.apply(&ServerEvent::SyncState(snapshot.clone()));
    assert!(view.matches(&snapshot));
    assert_eq!(view.room_id, "r");
}
