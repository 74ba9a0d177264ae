//! Addressing and change walks over nested aggregates

use super::fixtures::sample_container;
use serde_json::json;
use trackable::trackable::set_default_tracker_deep;
use trackable::tree::{changed_trackables_with_path, get_trackable_by_path, require_path_mut};
use trackable::{Shape, TrackError, Trackable, TrackableDictionary, TrackableList};

#[test]
fn test_resolves_fields_keys_and_indexes() {
    let container = sample_container();
    assert_eq!(get_trackable_by_path(&container, "person").unwrap().shape(), Shape::Poco);
    assert_eq!(
        get_trackable_by_path(&container, "person.hand").unwrap().to_value().unwrap(),
        json!({"ring": "gold", "power": 5})
    );
    assert!(get_trackable_by_path(&container, "set.1").is_none());
    assert!(get_trackable_by_path(&container, "missing").is_none());

    let mut grid: TrackableList<TrackableList<i32>> = TrackableList::new();
    grid.push_back([1, 2].into_iter().collect());
    grid.push_back([3].into_iter().collect());
    assert_eq!(get_trackable_by_path(&grid, "1").unwrap().to_value().unwrap(), json!([3]));
    assert!(get_trackable_by_path(&grid, "2").is_none());
}

#[test]
fn test_walk_finds_changes_below_unchanged_parents() {
    let mut container = sample_container();
    set_default_tracker_deep(&mut container);
    assert!(changed_trackables_with_path(&container).is_empty());

    container.person.hand_mut().set_power(6);
    container.set.insert(4);
    assert!(!container.person.changed());

    let paths: Vec<String> = changed_trackables_with_path(&container)
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(paths, vec!["person.hand".to_string(), "set".to_string()]);
}

#[test]
fn test_walk_reports_parent_and_child_changes() {
    let mut nested: TrackableDictionary<String, TrackableDictionary<String, i32>> =
        TrackableDictionary::new();
    nested.insert("x".to_string(), [("a".to_string(), 1)].into_iter().collect());
    set_default_tracker_deep(&mut nested);

    nested.get_mut(&"x".to_string()).unwrap().insert("b".to_string(), 2);
    nested.insert("y".to_string(), TrackableDictionary::new());

    let found = changed_trackables_with_path(&nested);
    let paths: Vec<&str> = found.iter().map(|(path, _)| path.as_str()).collect();
    assert_eq!(paths, vec!["", "x"]);
    assert_eq!(found[1].1.change_set().unwrap().unwrap().len(), 1);
}

#[test]
fn test_mutation_through_path() {
    let mut container = sample_container();
    set_default_tracker_deep(&mut container);

    let node = require_path_mut(&mut container, "dictionary").unwrap();
    assert_eq!(node.shape(), Shape::Dictionary);
    node.clear_changes();

    assert!(matches!(
        require_path_mut(&mut container, "person.foot"),
        Err(TrackError::UnknownPath(path)) if path == "person.foot"
    ));
}
