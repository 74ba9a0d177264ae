//! Document mapping against a temporary sled store

use super::fixtures::{sample_container, DataContainer, Hand, Person};
use super::sessions::Counting;
use serde_json::json;
use trackable::config::DocumentSettings;
use trackable::keys;
use trackable::mapper::document::{DocumentMapper, DocumentSession, SledDocumentStore};
use trackable::trackable::{clear_deep, set_default_tracker_deep};
use trackable::tree::get_trackable_by_path;
use trackable::{
    save_and_clear, BackendErrorKind, Key, Mapper, MapperError, Trackable, TrackableDictionary,
    TrackableList, TrackableSet, Value,
};

fn store() -> Counting<SledDocumentStore> {
    Counting::new(SledDocumentStore::temporary().unwrap())
}

async fn stored_container(store: &Counting<SledDocumentStore>, id: &str) -> DataContainer {
    let mapper = DocumentMapper::<DataContainer>::new();
    let container = sample_container();
    mapper.create(store, &container, &keys![id]).await.unwrap();
    container
}

#[tokio::test]
async fn test_document_round_trip_strips_id() {
    let store = store();
    let mapper = DocumentMapper::<DataContainer>::new();
    let container = stored_container(&store, "c1").await;

    let raw = store.inner().find(&Key::from("c1"), None).await.unwrap().unwrap();
    assert_eq!(raw["_id"], json!("c1"));
    assert_eq!(raw["person"]["hand"], json!({"ring": "gold", "power": 5}));

    let loaded = mapper.load(&store, &keys!["c1"]).await.unwrap().unwrap();
    assert_eq!(loaded, container);
    assert!(mapper.load(&store, &keys!["missing"]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_tree_replays_every_changed_node() {
    let store = store();
    let mapper = DocumentMapper::<DataContainer>::new();
    let mut container = stored_container(&store, "c1").await;
    set_default_tracker_deep(&mut container);

    container.person.set_age(44);
    container.person.hand_mut().set_ring("jade");
    container.dictionary.remove(&1);
    container.dictionary.insert(2, "deux".to_string());
    container.dictionary.insert(7, "sept".to_string());
    container.list.push_back("c".to_string());
    container.list.push_back("d".to_string());
    container.list.push_front("z".to_string());
    container.list.set(0, "Z".to_string());
    container.list.remove_at(2);
    container.set.insert(4);
    container.set.remove(&1);

    let calls = store.calls();
    assert_eq!(mapper.save_tree(&store, &container, &keys!["c1"]).await.unwrap(), 1);
    assert_eq!(store.calls(), calls + 1);
    assert!(container.changed());

    let loaded = mapper.load(&store, &keys!["c1"]).await.unwrap().unwrap();
    assert_eq!(loaded, container);
    assert_eq!(loaded.list.as_slice(), ["Z", "a", "c", "d"]);

    clear_deep(&mut container);
    let calls = store.calls();
    assert_eq!(mapper.save_tree(&store, &container, &keys!["c1"]).await.unwrap(), 0);
    assert_eq!(store.calls(), calls);
}

#[tokio::test]
async fn test_field_mappers_save_below_the_root() {
    let store = store();
    let mut container = stored_container(&store, "c1").await;
    set_default_tracker_deep(&mut container);

    let person_mapper = DocumentMapper::<Person>::new();
    container.person.set_name("Bea");
    let person_keys = keys!["c1", "person"];
    let written = save_and_clear(&person_mapper, &store, &mut container.person, &person_keys)
        .await
        .unwrap();
    assert_eq!(written, 1);

    let set_mapper = DocumentMapper::<TrackableSet<i32>>::new();
    container.set.remove(&2);
    container.set.insert(11);
    save_and_clear(&set_mapper, &store, &mut container.set, &keys!["c1", "set"]).await.unwrap();
    assert!(!container.changed());

    let person = person_mapper.load(&store, &keys!["c1", "person"]).await.unwrap().unwrap();
    assert_eq!(person.name(), "Bea");
    assert_eq!(person.hand(), &Hand::new("gold", 5));
    let set = set_mapper.load(&store, &keys!["c1", "set"]).await.unwrap().unwrap();
    assert_eq!(set, container.set);
}

#[tokio::test]
async fn test_unchanged_value_saves_without_io() {
    let store = store();
    let mut container = stored_container(&store, "c1").await;
    set_default_tracker_deep(&mut container);

    let mapper = DocumentMapper::<Person>::new();
    let calls = store.calls();
    let written = save_and_clear(&mapper, &store, &mut container.person, &keys!["c1", "person"])
        .await
        .unwrap();
    assert_eq!(written, 0);
    assert_eq!(store.calls(), calls);

    assert!(matches!(
        mapper.load(&store, &[]).await,
        Err(MapperError::KeyArity { required: 1, supplied: 0 })
    ));
}

#[tokio::test]
async fn test_partial_load_matches_navigation() {
    let store = store();
    let mapper = DocumentMapper::<DataContainer>::new();
    let container = stored_container(&store, "c1").await;

    let hand: Value = mapper
        .load_partial(&store, &keys!["c1", "person", "hand"])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        hand,
        get_trackable_by_path(&container, "person.hand").unwrap().to_value().unwrap()
    );

    let entry: Option<String> = mapper
        .load_partial(&store, &keys!["c1", "dictionary", 2])
        .await
        .unwrap();
    assert_eq!(entry.as_ref(), container.dictionary.get(&2));
    let item: Option<String> = mapper.load_partial(&store, &keys!["c1", "list", 1]).await.unwrap();
    assert_eq!(item.as_deref(), Some("b"));
    let gone: Option<String> = mapper.load_partial(&store, &keys!["c1", "list", 9]).await.unwrap();
    assert!(gone.is_none());
}

#[tokio::test]
async fn test_partial_create_and_delete() {
    let store = store();
    let hand_mapper = DocumentMapper::<Hand>::new();

    hand_mapper
        .create(&store, &Hand::new("opal", 2), &keys!["c2", "person", "hand"])
        .await
        .unwrap();
    let loaded = hand_mapper.load(&store, &keys!["c2", "person", "hand"]).await.unwrap();
    assert_eq!(loaded, Some(Hand::new("opal", 2)));

    assert_eq!(hand_mapper.delete(&store, &keys!["c2", "person", "hand"]).await.unwrap(), 1);
    assert!(hand_mapper.load(&store, &keys!["c2", "person", "hand"]).await.unwrap().is_none());

    let root_mapper = DocumentMapper::<Value>::new();
    assert_eq!(root_mapper.delete(&store, &keys!["c2"]).await.unwrap(), 1);
    assert!(root_mapper.load(&store, &keys!["c2"]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_collection_stays_present() {
    let store = store();
    let mapper = DocumentMapper::<TrackableSet<i32>>::new();

    mapper.create(&store, &TrackableSet::new(), &keys!["c3", "tags"]).await.unwrap();
    let loaded = mapper.load(&store, &keys!["c3", "tags"]).await.unwrap();
    assert!(matches!(loaded, Some(set) if set.is_empty()));
    assert!(mapper.load(&store, &keys!["c3", "other"]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_update_leaves_document_and_changes() {
    let store = store();
    let list_mapper = DocumentMapper::<TrackableList<String>>::new();
    list_mapper
        .create(&store, &["a".to_string()].into_iter().collect(), &keys!["c4", "list"])
        .await
        .unwrap();

    let mut list: TrackableList<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    list.set_default_tracker();
    list.set(0, "x".to_string());
    list.remove_at(1);

    let err = save_and_clear(&list_mapper, &store, &mut list, &keys!["c4", "list"])
        .await
        .unwrap_err();
    let backend = match err {
        MapperError::Backend(backend) => backend,
        other => panic!("expected a backend error, got {:?}", other),
    };
    assert_eq!(backend.kind, BackendErrorKind::WrongType);
    assert_eq!(backend.first_unapplied, Some(1));
    assert!(list.changed());

    let stored = list_mapper.load(&store, &keys!["c4", "list"]).await.unwrap().unwrap();
    assert_eq!(stored.as_slice(), ["a"]);
}

#[tokio::test]
async fn test_key_holding_the_separator() {
    type Versions = TrackableDictionary<String, String>;
    let store = store();
    let mapper = DocumentMapper::<Versions>::new();
    let mut versions = Versions::new();
    versions.set_default_tracker();
    versions.insert("v1.2".to_string(), "beta".to_string());

    let result = save_and_clear(&mapper, &store, &mut versions, &keys!["c5", "versions"]).await;
    assert!(matches!(
        result,
        Err(MapperError::UnsupportedOperation { backend: "document", .. })
    ));
    assert_eq!(store.calls(), 0);
    assert!(versions.changed());

    let settings = DocumentSettings {
        path_separator: "/".to_string(),
        ..DocumentSettings::default()
    };
    let store = Counting::new(SledDocumentStore::temporary().unwrap().with_settings(&settings));
    let mapper = DocumentMapper::<Versions>::with_settings(settings);
    save_and_clear(&mapper, &store, &mut versions, &keys!["c5", "versions"]).await.unwrap();
    let entry: Option<String> = mapper
        .load_partial(&store, &keys!["c5", "versions", "v1.2"])
        .await
        .unwrap();
    assert_eq!(entry.as_deref(), Some("beta"));
}
