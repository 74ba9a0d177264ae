//! Shipping a tree's changes to a replica

use super::fixtures::{sample_container, DataContainer};
use trackable::codec::{
    apply_changes, apply_encoded, changed_trackers_with_path, decode_changes, encode_changes,
};
use trackable::trackable::set_default_tracker_deep;
use trackable::{ChangeSet, Shape, Trackable};

fn tracked_sample() -> DataContainer {
    let mut container = sample_container();
    set_default_tracker_deep(&mut container);
    container
}

#[test]
fn test_replica_converges_after_apply() {
    let mut source = tracked_sample();
    let mut replica = tracked_sample();

    source.person.set_age(31);
    source.person.hand_mut().set_ring("silver");
    source.dictionary.remove(&1);
    source.dictionary.insert(5, "five".to_string());
    source.list.push_front("first".to_string());
    source.list.set(1, "A".to_string());
    source.set.insert(9);

    let text = encode_changes(&source).unwrap();
    apply_encoded(&mut replica, &text).unwrap();

    assert_eq!(replica, source);
    assert!(replica.changed());
}

#[test]
fn test_changed_trackers_are_paired_with_paths() {
    let mut source = tracked_sample();
    source.person.hand_mut().set_power(1);
    source.list.pop_back();

    let found = changed_trackers_with_path(&source).unwrap();
    let summary: Vec<(&str, Shape)> = found
        .iter()
        .map(|(path, cs)| (path.as_str(), cs.shape()))
        .collect();
    assert_eq!(summary, vec![("person.hand", Shape::Poco), ("list", Shape::List)]);
}

#[test]
fn test_decoded_map_is_ordered_by_path() {
    let mut source = tracked_sample();
    source.set.remove(&1);
    source.person.set_name("Zed");
    source.dictionary.insert(1, "uno".to_string());

    let changes = decode_changes(&encode_changes(&source).unwrap()).unwrap();
    let paths: Vec<&str> = changes.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["dictionary", "person", "set"]);
    assert!(matches!(changes.get("set"), Some(ChangeSet::Set(entries)) if entries.len() == 1));
}

#[test]
fn test_apply_stops_at_unknown_path() {
    let mut source = tracked_sample();
    source.set.insert(100);
    let mut changes = decode_changes(&encode_changes(&source).unwrap()).unwrap();
    let set_changes = changes.remove("set").unwrap();
    changes.insert("nowhere".to_string(), set_changes);

    let mut replica = tracked_sample();
    assert!(apply_changes(&mut replica, &changes).is_err());
    assert!(!replica.set.contains(&100));
}
