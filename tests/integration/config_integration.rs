//! Integration tests for the Configuration System

use super::fixtures::{sample_container, DataContainer};
use super::sessions::Counting;
use std::fs;
use tempfile::TempDir;
use trackable::config::ConfigLoader;
use trackable::keys;
use trackable::mapper::document::{DocumentMapper, DocumentSession, SledDocumentStore};
use trackable::mapper::kv::{KvMapper, MemoryKvStore};
use trackable::mapper::sql::{ColumnDef, DictionaryTable, SetTable, SqlMapper, SqliteSession, Table};
use trackable::trackable::set_default_tracker_deep;
use trackable::{Key, Mapper, MapperError, Trackable, TrackableDictionary, TrackableSet, ValueKind};

const CONFIG: &str = r#"
[sql]
max_batch_rows = 2

[document]
id_field = "key"
path_separator = "/"

[kv]
key_separator = "|"

[logging]
level = "debug"
format = "json"
"#;

fn write_config(dir: &TempDir, text: &str) -> std::path::PathBuf {
    let path = dir.path().join("trackable.toml");
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_config_file_layers_over_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[kv]\nkey_separator = \"/\"\n");

    let config = ConfigLoader::load(Some(&path)).unwrap();
    assert_eq!(config.kv.key_separator, "/");
    assert_eq!(config.document.id_field, "_id");
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[document]\npath_separator = \"\"\n");
    assert!(matches!(ConfigLoader::load(Some(&path)), Err(MapperError::Config(_))));
}

#[tokio::test]
async fn test_document_settings_drive_the_mapper() {
    let dir = TempDir::new().unwrap();
    let config = ConfigLoader::load(Some(&write_config(&dir, CONFIG))).unwrap();

    let store = Counting::new(
        SledDocumentStore::open(dir.path().join("documents"))
            .unwrap()
            .with_settings(&config.document),
    );
    let mapper = DocumentMapper::<DataContainer>::with_settings(config.document.clone());

    let mut container = sample_container();
    mapper.create(&store, &container, &keys!["c1"]).await.unwrap();
    let raw = store.inner().find(&Key::from("c1"), None).await.unwrap().unwrap();
    assert_eq!(raw["key"], serde_json::json!("c1"));

    set_default_tracker_deep(&mut container);
    container.dictionary.insert(5, "five".to_string());
    container.person.hand_mut().set_power(8);
    mapper.save_tree(&store, &container, &keys!["c1"]).await.unwrap();

    let hand: Option<serde_json::Value> = mapper
        .load_partial(&store, &keys!["c1", "person", "hand"])
        .await
        .unwrap();
    assert_eq!(hand.unwrap()["power"], serde_json::json!(8));
    assert_eq!(mapper.load(&store, &keys!["c1"]).await.unwrap(), Some(container));
}

#[tokio::test]
async fn test_sql_and_kv_settings_drive_the_mappers() {
    let config = ConfigLoader::from_toml(CONFIG).unwrap();

    let table = DictionaryTable::new(
        "dict",
        ColumnDef::new("key", ValueKind::Int),
        ColumnDef::new("value", ValueKind::Text),
    )
    .with_settings(&config.sql);
    let mapper = SqlMapper::<TrackableDictionary<i32, String>>::from_table(table);
    let session = SqliteSession::open_in_memory().unwrap();
    mapper.create_table(&session, false).await.unwrap();

    let map: TrackableDictionary<i32, String> = (0..5).map(|i| (i, i.to_string())).collect();
    let mut tracked = TrackableDictionary::new();
    tracked.set_default_tracker();
    for (k, v) in map.iter() {
        tracked.insert(*k, v.clone());
    }
    let statements = mapper.table().update(&tracked.change_set().unwrap().unwrap(), &[]).unwrap();
    assert_eq!(statements.len(), 3);

    let set_table =
        SetTable::new("tags", ColumnDef::new("tag", ValueKind::Int)).with_settings(&config.sql);
    let tags: TrackableSet<i32> = (0..5).collect();
    let inserts = set_table.insert(&serde_json::to_value(&tags).unwrap(), &[]).unwrap();
    assert_eq!(inserts.len(), 3);

    let kv = KvMapper::<TrackableDictionary<i32, String>>::dictionary()
        .with_settings(config.kv.clone());
    let store = MemoryKvStore::new();
    kv.create(&store, &map, &keys!["a", "b"]).await.unwrap();
    assert!(store.contains_key("a|b"));
}
