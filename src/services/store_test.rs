use super::*;

fn saved(room_id: &str, saved_at: i64) -> SavedSession {
    SavedSession {
        id: Uuid::new_v4(),
        room_id: room_id.into(),
        strokes: Vec::new(),
        operations: Vec::new(),
        saved_at,
        saved_by: "ann".into(),
    }
}

#[tokio::test]
async fn memory_store_save_then_load() {
    let store = MemoryStore::new();
    let session = saved("studio", 10);
    store.save(&session).await.unwrap();
    assert_eq!(store.load(session.id).await.unwrap(), session);
}

#[tokio::test]
async fn memory_store_load_missing_is_not_found() {
    let store = MemoryStore::new();
    let id = Uuid::new_v4();
    let err = store.load(id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(missing) if missing == id));
    assert_eq!(err.error_code(), "E_SESSION_NOT_FOUND");
}

#[tokio::test]
async fn memory_store_lists_one_room_newest_first() {
    let store = MemoryStore::new();
    let old = saved("studio", 10);
    let new = saved("studio", 20);
    store.save(&old).await.unwrap();
    store.save(&new).await.unwrap();
    store.save(&saved("other", 30)).await.unwrap();

    let listed: Vec<Uuid> = store
        .list("studio")
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(listed, vec![new.id, old.id]);
    assert!(store.list("nobody").await.unwrap().is_empty());
}

#[test]
fn summary_counts_contents() {
    let mut session = saved("studio", 1);
    session.strokes.push(crate::model::Stroke {
        id: "s1".into(),
        author_id: Uuid::nil(),
        tool: crate::model::Tool::Pen,
        geometry: crate::model::Geometry::Freehand { points: vec![crate::model::Point::new(0.0, 0.0)] },
        color: "#000".into(),
        width: 2.0,
        filled: false,
        committed_at: 1,
    });
    let summary = SessionSummary::from(&session);
    assert_eq!(summary.stroke_count, 1);
    assert_eq!(summary.operation_count, 0);
}
