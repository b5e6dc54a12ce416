/*
    migration_integration.rs - Migrating collections held in real stores

    Exercises migrate_stored() over the file-backed store: the chain is
    applied in order, history gets exactly one entry per call, and failures
    leave the stored bytes alone.
*/

use kvsync_core::migration::{add_field, MigrationEngine, MigrationError};
use kvsync_core::storage::{BackingStore, FileStore, StoredPayload};
use serde_json::{json, Value};
use tempfile::tempdir;

fn upper_titles(items: Vec<Value>) -> Value {
    Value::Array(
        items
            .into_iter()
            .map(|mut item| {
                if let Some(title) = item.get("title").and_then(Value::as_str).map(str::to_uppercase) {
                    item["title"] = json!(title);
                }
                item
            })
            .collect(),
    )
}

/// Engine with every known step up to `target`
fn engine(target: u32) -> MigrationEngine {
    let mut engine = MigrationEngine::new(target);
    if target >= 2 {
        engine = engine.register(2, add_field("done", json!(false)));
    }
    if target >= 3 {
        engine = engine.register(3, upper_titles);
    }
    engine
}

#[tokio::test]
async fn test_legacy_file_migrates_to_latest() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    store.save("todos", br#"[{"id":1,"title":"milk"},{"id":2,"title":"eggs"}]"#).await.unwrap();

    let report = engine(3).migrate_stored(&store, "todos").await.unwrap();
    assert!(report.persisted);

    let bytes = store.retrieve("todos").await.unwrap();
    let collection = StoredPayload::decode(bytes.as_deref()).unwrap().into_versioned();
    assert_eq!(collection.schema_version, 3);
    assert_eq!(collection.items[0], json!({"id": 1, "title": "MILK", "done": false}));
    assert_eq!(collection.migration_history.len(), 1);
    assert_eq!(collection.migration_history[0].from_version, 1);
    assert_eq!(collection.migration_history[0].to_version, 3);
    assert_eq!(collection.migration_history[0].item_count, 2);
}

#[tokio::test]
async fn test_stepwise_upgrades_append_history() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    store.save("todos", br#"[{"id":1,"title":"milk"}]"#).await.unwrap();

    engine(2).migrate_stored(&store, "todos").await.unwrap();
    engine(3).migrate_stored(&store, "todos").await.unwrap();
    // Already current: nothing appended
    engine(3).migrate_stored(&store, "todos").await.unwrap();

    let bytes = store.retrieve("todos").await.unwrap();
    let collection = StoredPayload::decode(bytes.as_deref()).unwrap().into_versioned();
    let hops: Vec<(u32, u32)> = collection
        .migration_history
        .iter()
        .map(|r| (r.from_version, r.to_version))
        .collect();
    assert_eq!(hops, vec![(1, 2), (2, 3)]);
}

#[tokio::test]
async fn test_gap_leaves_file_untouched() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    let original = br#"[{"id":1,"title":"milk"}]"#;
    store.save("todos", original).await.unwrap();

    let gapped = MigrationEngine::new(3).register(3, upper_titles);
    let err = gapped.migrate_stored(&store, "todos").await.unwrap_err();
    assert!(matches!(err, MigrationError::MigrationGap { missing: 2, .. }));
    assert_eq!(store.retrieve("todos").await.unwrap(), Some(original.to_vec()));
}

#[tokio::test]
async fn test_newer_data_is_refused() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    store.save("todos", br#"{"schemaVersion":5,"items":[{"id":1}]}"#).await.unwrap();

    let err = engine(3).migrate_stored(&store, "todos").await.unwrap_err();
    assert!(matches!(err, MigrationError::DowngradeAttempted { recorded: 5, target: 3 }));
}
