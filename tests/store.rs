//! Integration tests for the macro collection and its persistence

use reachy_console::joints::JointName;
use reachy_console::kinematics::KinematicTable;
use reachy_console::macros::{FileStorage, Frame, Macro, MacroStore, MemoryStorage, StoreError, parse_macros};
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

const KEY: &str = "reachy_macros";

fn table() -> Arc<KinematicTable> {
    Arc::new(KinematicTable::reachy())
}

const TWO_MACROS: &str = r#"[
    {"name": "wave", "movements": [
        {"timestamp": 0, "joints": {"r_shoulder_pitch": -90}},
        {"timestamp": 1000, "joints": {"r_shoulder_pitch": -60}}
    ]},
    {"name": "nod", "movements": [{"neck_pitch": 10}, {"neck_pitch": -10}]}
]"#;

#[tokio::test]
async fn test_load_reads_storage_once() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(KEY, TWO_MACROS).await;
    let store = MacroStore::new(storage.clone(), KEY, table());

    assert!(assert_ok!(store.load().await));
    assert!(!assert_ok!(store.load().await));
    assert_eq!(storage.reads(), 1);

    let names: Vec<String> = store.list().await.into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["wave".to_string(), "nod".to_string()]);
    let wave = store.list().await.remove(0);
    assert_eq!(wave.frames, 2);
    assert_eq!(wave.span_ms, Some(1000.0));
}

#[tokio::test]
async fn test_empty_macro_survives_import_and_export() {
    let store = MacroStore::new(Arc::new(MemoryStorage::new()), KEY, table());
    store.load().await.unwrap();
    let names = store.import(r#"[{"name":"A","movements":[]}]"#).await.unwrap();
    assert_eq!(names, vec!["A".to_string()]);

    let exported = store.export().await.unwrap();
    let parsed = parse_macros(&exported, &KinematicTable::reachy()).unwrap();
    assert_eq!(parsed, vec![Macro::new("A", Vec::new())]);
}

#[tokio::test]
async fn test_bad_import_changes_nothing() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(KEY, TWO_MACROS).await;
    let store = MacroStore::new(storage.clone(), KEY, table());
    store.load().await.unwrap();

    let bad = r#"[{"name":"ok","movements":[]},{"name":"broken","movements":[{"elbow":1}]}]"#;
    assert!(matches!(store.import(bad).await, Err(StoreError::InvalidFormat(_))));
    assert_err!(store.import("not json").await);
    assert!(matches!(store.import(r#"{"name":"x"}"#).await, Err(StoreError::InvalidFormat(_))));
    assert_eq!(store.len().await, 2);
    assert_eq!(storage.writes(), 0);
}

#[tokio::test]
async fn test_imported_names_are_made_unique() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(KEY, TWO_MACROS).await;
    let store = MacroStore::new(storage, KEY, table());
    store.load().await.unwrap();

    let names = store
        .import(r#"[{"name":"wave","movements":[]},{"name":"wave","movements":[]}]"#)
        .await
        .unwrap();
    assert_eq!(names, vec!["wave (2)".to_string(), "wave (3)".to_string()]);
    assert_eq!(store.len().await, 4);
}

#[tokio::test]
async fn test_file_storage_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let first = MacroStore::new(Arc::new(FileStorage::new(dir.path())), KEY, table());
    first.load().await.unwrap();
    let frame = Frame::new(Some(0.0), [(JointName::NeckYaw, 30.0)].into_iter().collect());
    first.add(Macro::new("look", vec![frame])).await.unwrap();
    first.import(TWO_MACROS).await.unwrap();
    first.delete(1).await.unwrap();

    let second = MacroStore::new(Arc::new(FileStorage::new(dir.path())), KEY, table());
    assert!(second.load().await.unwrap());
    let names: Vec<String> = second.list().await.into_iter().map(|m| m.name).collect();
    assert_eq!(names, vec!["look".to_string(), "nod".to_string()]);
    let look = second.get_by_name("look").await.unwrap();
    assert_eq!(look.movements[0].joints.get(JointName::NeckYaw), Some(30.0));
}

#[tokio::test]
async fn test_unnamed_imports_get_default_names() {
    let storage = Arc::new(MemoryStorage::new());
    storage.seed(KEY, TWO_MACROS).await;
    let store = MacroStore::new(storage, KEY, table());
    store.load().await.unwrap();

    let names = store
        .import(r#"[{"movements":[{"timestamp":0,"joints":{"neck_yaw":1}}]}]"#)
        .await
        .unwrap();
    assert_eq!(names, vec!["Macro-3".to_string()]);

    let names = store
        .import(r#"[{"movements":[]},{"name":"","movements":[]},{"name":"wave","movements":[]}]"#)
        .await
        .unwrap();
    assert_eq!(
        names,
        vec!["Macro-4".to_string(), "Macro-5".to_string(), "wave (2)".to_string()]
    );
    let neck = store.get_by_name("Macro-3").await.unwrap();
    assert_eq!(neck.movements[0].joints.get(JointName::NeckYaw), Some(1.0));
    assert_eq!(store.next_default_name().await, "Macro-7");
}
