//! Relational mapping against an in-memory SQLite database

use super::fixtures::{Hand, Inventory, Person, Ticket};
use super::sessions::Counting;
use std::collections::BTreeMap;
use std::sync::Arc;
use trackable::keys;
use trackable::mapper::sql::{
    ColumnDef, ContainerTable, DictionaryTable, PocoTable, SetTable, SqlMapper, SqlSession,
    SqliteSession, Table,
};
use trackable::trackable::set_default_tracker_deep;
use trackable::tree::get_trackable_by_path;
use trackable::{
    save_and_clear, BackendErrorKind, FieldOptions, Mapper, MapperError, Poco, ShapeRegistry,
    Trackable, TrackableDictionary, TrackableSet, ValueKind,
};

type Dict = TrackableDictionary<i32, String>;

fn session() -> Counting<SqliteSession> {
    Counting::new(SqliteSession::open_in_memory().unwrap())
}

fn dictionary_mapper() -> SqlMapper<Dict> {
    SqlMapper::from_table(
        DictionaryTable::new(
            "dict",
            ColumnDef::new("key", ValueKind::Int),
            ColumnDef::new("value", ValueKind::Text),
        )
        .with_head_key(ColumnDef::new("owner", ValueKind::Int)),
    )
}

fn scenario_map() -> Dict {
    [(1, "One"), (2, "Two"), (3, "Three")]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
}

fn person_mapper() -> SqlMapper<Person> {
    let mut registry = ShapeRegistry::new();
    registry.register_poco::<Person>();
    SqlMapper::from_table(
        PocoTable::from_registry::<Person>(&registry, "person")
            .unwrap()
            .with_head_key(ColumnDef::new("team", ValueKind::Int))
            .with_field_options("name", FieldOptions::primary_key())
            .unwrap(),
    )
}

#[tokio::test]
async fn test_dictionary_scenario_round_trip() {
    let session = session();
    let mapper = dictionary_mapper();
    mapper.create_table(&session, false).await.unwrap();

    let mut map = scenario_map();
    mapper.create(&session, &map, &keys![1]).await.unwrap();
    map.set_default_tracker();

    let calls = session.calls();
    assert_eq!(save_and_clear(&mapper, &session, &mut map, &keys![1]).await.unwrap(), 0);
    assert_eq!(session.calls(), calls);

    map.remove(&1);
    map.insert(2, "TwoTwo".to_string());
    map.insert(4, "Four".to_string());
    let written = save_and_clear(&mapper, &session, &mut map, &keys![1]).await.unwrap();
    assert_eq!(written, 3);
    assert!(!map.changed());

    let loaded = mapper.load(&session, &keys![1]).await.unwrap().unwrap();
    let expected: BTreeMap<i32, String> = [(2, "TwoTwo"), (3, "Three"), (4, "Four")]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect();
    assert_eq!(loaded.as_map(), &expected);
}

#[tokio::test]
async fn test_dictionary_rows_are_scoped_by_head_key() {
    let session = session();
    let mapper = dictionary_mapper();
    mapper.create_table(&session, false).await.unwrap();

    mapper.create(&session, &scenario_map(), &keys![1]).await.unwrap();
    mapper
        .create(&session, &[(9, "Nine".to_string())].into_iter().collect(), &keys![2])
        .await
        .unwrap();

    assert_eq!(mapper.load(&session, &keys![1]).await.unwrap().unwrap().len(), 3);
    assert_eq!(mapper.load(&session, &keys![2]).await.unwrap().unwrap().len(), 1);
    assert!(mapper.load(&session, &keys![3]).await.unwrap().is_none());

    mapper.delete(&session, &keys![2]).await.unwrap();
    assert!(mapper.load(&session, &keys![2]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_dictionary_entry_load_matches_full_load() {
    let session = session();
    let mapper = dictionary_mapper();
    mapper.create_table(&session, false).await.unwrap();
    mapper.create(&session, &scenario_map(), &keys![1]).await.unwrap();

    let full = mapper.load(&session, &keys![1]).await.unwrap().unwrap();
    let entry = mapper.load_entry(&session, &keys![1, 2]).await.unwrap();
    assert_eq!(entry.as_ref(), full.get(&2));
    assert_eq!(mapper.load_entry(&session, &keys![1, 7]).await.unwrap(), None);

    assert!(matches!(
        mapper.load(&session, &keys![1, 2]).await,
        Err(MapperError::UnsupportedOperation { .. })
    ));
}

#[tokio::test]
async fn test_short_key_path_fails_before_io() {
    let session = session();
    let mapper = dictionary_mapper();
    let mut map = scenario_map();
    map.set_default_tracker();
    map.insert(8, "Eight".to_string());

    let result = save_and_clear(&mapper, &session, &mut map, &[]).await;
    assert!(matches!(result, Err(MapperError::KeyArity { required: 1, supplied: 0 })));
    assert_eq!(session.calls(), 0);
    assert!(map.changed());
}

#[tokio::test]
async fn test_failed_save_keeps_changes_for_retry() {
    let session = session();
    let mapper = dictionary_mapper();
    let mut map = scenario_map();
    map.set_default_tracker();
    map.insert(4, "Four".to_string());

    // table missing
    assert!(save_and_clear(&mapper, &session, &mut map, &keys![1]).await.is_err());
    assert!(map.changed());

    mapper.create_table(&session, false).await.unwrap();
    assert_eq!(save_and_clear(&mapper, &session, &mut map, &keys![1]).await.unwrap(), 1);
    assert!(!map.changed());
}

#[tokio::test]
async fn test_constraint_on_save_is_a_backend_error() {
    let session = session();
    let mapper = dictionary_mapper();
    mapper.create_table(&session, false).await.unwrap();

    let mut map = scenario_map();
    mapper.create(&session, &map, &keys![1]).await.unwrap();
    map.set_default_tracker();
    map.insert(4, "Four".to_string());

    // another writer added the same entry first
    let other: Dict = [(4, "Vier".to_string())].into_iter().collect();
    mapper.create(&session, &other, &keys![1]).await.unwrap();

    let err = save_and_clear(&mapper, &session, &mut map, &keys![1]).await.unwrap_err();
    let backend = match err {
        MapperError::Backend(backend) => backend,
        other => panic!("expected a backend error, got {:?}", other),
    };
    assert_eq!(backend.kind, BackendErrorKind::Constraint);
    assert!(map.changed());

    assert!(matches!(
        mapper.create(&session, &other, &keys![1]).await,
        Err(MapperError::Duplicate(_))
    ));
}

#[tokio::test]
async fn test_large_insert_is_batched() {
    let session = session();
    let mapper = SqlMapper::<Dict>::from_table(
        DictionaryTable::new(
            "dict",
            ColumnDef::new("key", ValueKind::Int),
            ColumnDef::new("value", ValueKind::Text),
        )
        .with_head_key(ColumnDef::new("owner", ValueKind::Int))
        .with_max_batch_rows(10),
    );
    mapper.create_table(&session, false).await.unwrap();

    let mut map = Dict::new();
    map.set_default_tracker();
    for i in 0..25 {
        map.insert(i, format!("v{}", i));
    }
    let statements = mapper.table().update(&map.change_set().unwrap().unwrap(), &keys![1]).unwrap();
    assert_eq!(statements.len(), 3);

    save_and_clear(&mapper, &session, &mut map, &keys![1]).await.unwrap();
    assert_eq!(mapper.load(&session, &keys![1]).await.unwrap().unwrap().len(), 25);
}

#[tokio::test]
async fn test_poco_create_load_save() {
    let session = session();
    let mapper = person_mapper();
    mapper.create_table(&session, false).await.unwrap();

    let mut alice = Person::new("Alice", 30);
    mapper.create(&session, &alice, &keys![1, "Alice"]).await.unwrap();
    mapper.create(&session, &Person::new("Bob", 40), &keys![1, "Bob"]).await.unwrap();

    let duplicate = mapper.create(&session, &alice, &keys![1, "Alice"]).await;
    assert!(matches!(duplicate, Err(MapperError::Duplicate(_))));

    alice.set_default_tracker();
    alice.set_age(31);
    alice.hand_mut().set_default_tracker();
    alice.hand_mut().set_power(3);
    assert_eq!(save_and_clear(&mapper, &session, &mut alice, &keys![1, "Alice"]).await.unwrap(), 1);

    let loaded = mapper.load(&session, &keys![1, "Alice"]).await.unwrap().unwrap();
    assert_eq!(loaded.age(), 31);
    assert_eq!(loaded.hand(), &Hand::default());

    let team = mapper.load_all(&session, &keys![1]).await.unwrap();
    let names: Vec<&str> = team.iter().map(Person::name).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);
}

#[tokio::test]
async fn test_poco_save_requires_full_primary_key() {
    let session = session();
    let mapper = person_mapper();
    let mut alice = Person::new("Alice", 30);
    alice.set_default_tracker();
    alice.set_age(31);

    let result = mapper.save(&session, &alice.change_set().unwrap().unwrap(), &keys![1]).await;
    assert!(matches!(result, Err(MapperError::KeyArity { required: 2, supplied: 1 })));
    assert_eq!(session.calls(), 0);
}

#[tokio::test]
async fn test_identity_is_assigned_without_tracking() {
    let session = session();
    let mapper =
        SqlMapper::<Ticket>::from_table(PocoTable::new("ticket", Arc::new(Ticket::schema())));
    mapper.create_table(&session, true).await.unwrap();

    let mut first = Ticket::new("first");
    let mut second = Ticket::new("second");
    second.set_default_tracker();
    assert_eq!(mapper.create_with_identity(&session, &mut first, &[]).await.unwrap(), 1);
    assert_eq!(mapper.create_with_identity(&session, &mut second, &[]).await.unwrap(), 2);
    assert_eq!(second.id(), 2);
    assert!(!second.changed());

    second.set_title("renamed");
    save_and_clear(&mapper, &session, &mut second, &keys![2]).await.unwrap();
    let loaded = mapper.load(&session, &keys![2]).await.unwrap().unwrap();
    assert_eq!(loaded.title(), "renamed");
    assert_eq!(loaded.id(), 2);
}

#[tokio::test]
async fn test_set_table_empty_is_absent() {
    let session = session();
    let mapper = SqlMapper::<TrackableSet<i32>>::from_table(
        SetTable::new("tags", ColumnDef::new("tag", ValueKind::Int))
            .with_head_key(ColumnDef::new("owner", ValueKind::Int)),
    );
    mapper.create_table(&session, false).await.unwrap();

    let mut tags: TrackableSet<i32> = [1, 2].into_iter().collect();
    mapper.create(&session, &tags, &keys![5]).await.unwrap();
    tags.set_default_tracker();
    tags.insert(3);
    tags.remove(&1);
    save_and_clear(&mapper, &session, &mut tags, &keys![5]).await.unwrap();

    let loaded = mapper.load(&session, &keys![5]).await.unwrap().unwrap();
    assert_eq!(loaded, tags);

    tags.clear();
    save_and_clear(&mapper, &session, &mut tags, &keys![5]).await.unwrap();
    assert!(mapper.load(&session, &keys![5]).await.unwrap().is_none());
}

fn inventory_mapper() -> SqlMapper<Inventory> {
    let owner = ColumnDef::new("inventory", ValueKind::Int);
    let table = ContainerTable::new(Arc::new(<Inventory as trackable::Container>::schema()))
        .with_field(
            "owner",
            PocoTable::new("inv_owner", Arc::new(Person::schema())).with_head_key(owner.clone()),
        )
        .unwrap()
        .with_field(
            "stock",
            DictionaryTable::new(
                "inv_stock",
                ColumnDef::new("slot", ValueKind::Int),
                ColumnDef::new("item", ValueKind::Text),
            )
            .with_head_key(owner.clone()),
        )
        .unwrap()
        .with_field(
            "tags",
            SetTable::new("inv_tags", ColumnDef::new("tag", ValueKind::Int)).with_head_key(owner),
        )
        .unwrap()
        .build()
        .unwrap();
    SqlMapper::from_table(table)
}

fn sample_inventory() -> Inventory {
    Inventory {
        owner: Person::new("Carol", 50),
        stock: [(1, "apple".to_string()), (2, "pear".to_string())].into_iter().collect(),
        tags: [7, 8].into_iter().collect(),
    }
}

#[tokio::test]
async fn test_container_round_trip_and_save() {
    let session = session();
    let mapper = inventory_mapper();
    mapper.create_table(&session, false).await.unwrap();

    let mut inventory = sample_inventory();
    mapper.create(&session, &inventory, &keys![1]).await.unwrap();
    assert_eq!(mapper.load(&session, &keys![1]).await.unwrap().unwrap(), inventory);

    set_default_tracker_deep(&mut inventory);
    let calls = session.calls();
    assert_eq!(save_and_clear(&mapper, &session, &mut inventory, &keys![1]).await.unwrap(), 0);
    assert_eq!(session.calls(), calls);

    inventory.owner.set_age(51);
    inventory.stock.insert(3, "plum".to_string());
    inventory.tags.remove(&7);
    save_and_clear(&mapper, &session, &mut inventory, &keys![1]).await.unwrap();
    assert_eq!(session.calls(), calls + 1);
    assert!(!inventory.changed());

    assert_eq!(mapper.load(&session, &keys![1]).await.unwrap().unwrap(), inventory);
}

#[tokio::test]
async fn test_container_partial_load_matches_navigation() {
    let session = session();
    let mapper = inventory_mapper();
    mapper.create_table(&session, false).await.unwrap();
    mapper.create(&session, &sample_inventory(), &keys![1]).await.unwrap();

    let full = mapper.load(&session, &keys![1]).await.unwrap().unwrap();
    let stock: Dict = mapper.load_partial(&session, &keys![1, "stock"]).await.unwrap().unwrap();
    assert_eq!(
        stock.to_value().unwrap(),
        get_trackable_by_path(&full, "stock").unwrap().to_value().unwrap()
    );

    let item: String = mapper.load_partial(&session, &keys![1, "stock", 2]).await.unwrap().unwrap();
    assert_eq!(Some(&item), full.stock.get(&2));
}

#[test]
fn test_container_rejects_list_fields() {
    let schema = <super::fixtures::DataContainer as trackable::Container>::schema();
    let result = ContainerTable::new(Arc::new(schema))
        .with_field(
            "list",
            SetTable::new("list", ColumnDef::new("value", ValueKind::Text)),
        );
    assert!(matches!(result, Err(MapperError::UnsupportedOperation { .. })));
}

#[tokio::test]
async fn test_session_execute_is_atomic() {
    let session = SqliteSession::open_in_memory().unwrap();
    session
        .execute(&["CREATE TABLE t (id INTEGER PRIMARY KEY)".to_string()])
        .await
        .unwrap();
    let err = session
        .execute(&[
            "INSERT INTO t (id) VALUES (1)".to_string(),
            "INSERT INTO t (id) VALUES (1)".to_string(),
        ])
        .await
        .unwrap_err();
    assert_eq!(err.first_unapplied, Some(1));
    assert!(session.query("SELECT id FROM t").await.unwrap().is_empty());
}
