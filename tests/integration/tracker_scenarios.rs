//! Tracker behaviour over whole mutation sequences

use super::fixtures::{sample_container, sample_person, Person};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use trackable::trackable::{clear_deep, rollback_deep, set_default_tracker_deep};
use trackable::{
    ChangeSet, ContainerTracker, DictionaryChange, DictionaryOperation, FieldChange, ListOperation,
    SetOperation, Trackable, TrackableDictionary, TrackableList, TrackableSet, Tracked, Tracker,
};

fn scenario_map() -> TrackableDictionary<i32, String> {
    [(1, "One"), (2, "Two"), (3, "Three")]
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect()
}

#[test]
fn test_map_scenario_records_exact_changes() {
    let mut map = scenario_map();
    map.set_default_tracker();
    assert!(!map.changed());

    map.remove(&1);
    map.insert(2, "TwoTwo".to_string());
    map.insert(4, "Four".to_string());

    let tracker = map.tracker().unwrap();
    assert_eq!(tracker.len(), 3);
    assert_eq!(tracker.get(&1), Some(&DictionaryChange::remove("One".to_string())));
    assert_eq!(
        tracker.get(&2),
        Some(&DictionaryChange::modify("Two".to_string(), "TwoTwo".to_string()))
    );
    assert_eq!(tracker.get(&4), Some(&DictionaryChange::add("Four".to_string())));

    let ChangeSet::Dictionary(entries) = map.change_set().unwrap().unwrap() else {
        panic!("expected a dictionary changeset");
    };
    let ops: Vec<(serde_json::Value, DictionaryOperation)> =
        entries.into_iter().map(|(key, change)| (key, change.op)).collect();
    assert_eq!(
        ops,
        vec![
            (json!(1), DictionaryOperation::Remove),
            (json!(2), DictionaryOperation::Modify),
            (json!(4), DictionaryOperation::Add),
        ]
    );
}

#[test]
fn test_map_merge_table_collapses_per_key() {
    let mut map = scenario_map();
    map.set_default_tracker();

    // add then remove cancels
    map.insert(9, "Nine".to_string());
    map.remove(&9);
    // remove then add becomes modify
    map.remove(&1);
    map.insert(1, "Uno".to_string());
    // modify then remove keeps the first old value
    map.insert(2, "Dos".to_string());
    map.remove(&2);

    let tracker = map.tracker().unwrap();
    assert!(tracker.get(&9).is_none());
    assert_eq!(
        tracker.get(&1),
        Some(&DictionaryChange::modify("One".to_string(), "Uno".to_string()))
    );
    assert_eq!(tracker.get(&2), Some(&DictionaryChange::remove("Two".to_string())));
}

#[test]
fn test_list_scenario_keeps_full_log() {
    let mut list: TrackableList<String> =
        ["One", "Two", "Three"].iter().map(|s| s.to_string()).collect();
    list.set_default_tracker();

    list.set(0, "OneModified".to_string());
    list.insert(0, "Zero".to_string());
    list.remove_at(0);
    list.insert(0, "ZeroAgain".to_string());
    list.insert(4, "Four".to_string());
    list.remove_at(4);
    list.insert(4, "FourAgain".to_string());

    assert_eq!(
        list.as_slice(),
        ["ZeroAgain", "OneModified", "Two", "Three", "FourAgain"]
    );
    let ops: Vec<ListOperation> = list.tracker().unwrap().log().iter().map(|c| c.op).collect();
    assert_eq!(
        ops,
        vec![
            ListOperation::Modify,
            ListOperation::PushFront,
            ListOperation::PopFront,
            ListOperation::PushFront,
            ListOperation::PushBack,
            ListOperation::PopBack,
            ListOperation::PushBack,
        ]
    );

    list.rollback().unwrap();
    assert_eq!(list.as_slice(), ["One", "Two", "Three"]);
    assert!(!list.changed());
}

#[test]
fn test_set_scenario_add_remove_cancels() {
    let mut set: TrackableSet<i32> = [1, 2].into_iter().collect();
    set.set_default_tracker();

    set.insert(7);
    set.remove(&7);
    assert!(!set.changed());

    set.remove(&1);
    set.insert(1);
    assert!(!set.changed());

    set.insert(3);
    assert_eq!(
        set.change_set().unwrap(),
        Some(ChangeSet::Set(vec![(json!(3), SetOperation::Add)]))
    );
}

#[test]
fn test_poco_repeated_sets_collapse() {
    let mut person = sample_person();
    person.set_default_tracker();

    person.set_age(31);
    person.set_age(32);
    person.set_name("Alicia");

    let tracker = person.tracker().unwrap();
    assert_eq!(tracker.len(), 2);
    assert_eq!(
        tracker.get("age"),
        Some(&FieldChange {
            old: json!(30),
            new: json!(32)
        })
    );

    person.rollback().unwrap();
    assert_eq!(person, sample_person());
    assert!(!person.changed());
}

#[test]
fn test_untracked_mutations_are_invisible() {
    let mut person = sample_person();
    person.set_age(99);
    assert!(!person.is_tracked());
    assert_eq!(person.change_set().unwrap(), None);

    person.set_default_tracker();
    assert!(!person.changed());
}

#[test]
fn test_clone_drops_tracker() {
    let mut map = scenario_map();
    map.set_default_tracker();
    map.insert(5, "Five".to_string());

    let copy = map.clone();
    assert_eq!(copy, map);
    assert!(!copy.is_tracked());
}

#[test]
fn test_apply_to_replays_onto_another_value() {
    let mut source = scenario_map();
    source.set_default_tracker();
    source.remove(&3);
    source.insert(1, "Uno".to_string());

    let mut target = scenario_map();
    source.tracker().unwrap().apply_to(&mut target).unwrap();
    assert_eq!(target, source);
}

#[test]
fn test_rebinding_returns_detached_tracker() {
    let mut set: TrackableSet<i32> = TrackableSet::new();
    set.set_default_tracker();
    set.insert(1);

    let old = set.replace_tracker(None).unwrap();
    assert!(old.has_change());
    assert!(!set.changed());
}

#[test]
fn test_first_change_notification_fires_once() {
    let fired = Arc::new(AtomicUsize::new(0));
    let mut list: TrackableList<i32> = TrackableList::new();
    list.set_default_tracker();

    let counter = fired.clone();
    assert!(list.on_first_change(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    list.push_back(1);
    list.push_back(2);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_container_tracker_is_or_of_fields() {
    let mut container = sample_container();
    set_default_tracker_deep(&mut container);
    assert!(!ContainerTracker::capture(&container).unwrap().has_change());

    container.set.insert(10);
    container.person.hand_mut().set_power(9);
    let captured = ContainerTracker::capture(&container).unwrap();
    assert!(captured.has_change());
    assert!(captured.field("set").is_some());
    assert!(captured.field("dictionary").is_none());
    assert!(!container.has_own_change());
    assert!(container.changed());
}

#[test]
fn test_deep_rollback_restores_nested_values() {
    let original = sample_container();
    let mut container = original.clone();
    set_default_tracker_deep(&mut container);

    container.person.set_name("Bob");
    container.person.hand_mut().set_ring("iron");
    container.dictionary.insert(3, "three".to_string());
    container.list.push_front("z".to_string());
    container.set.remove(&2);

    rollback_deep(&mut container).unwrap();
    assert_eq!(container, original);
    assert!(!container.changed());
}

#[test]
fn test_deep_clear_forgets_everything() {
    let mut container = sample_container();
    set_default_tracker_deep(&mut container);
    container.person.hand_mut().set_power(1);
    container.list.pop_back();

    clear_deep(&mut container);
    assert!(!container.changed());
}

#[test]
fn test_nested_dictionary_of_records() {
    let mut people: TrackableDictionary<String, Person> = TrackableDictionary::new();
    people.insert("alice".to_string(), sample_person());
    set_default_tracker_deep(&mut people);

    people.get_mut(&"alice".to_string()).unwrap().set_age(40);
    assert!(!people.has_own_change());
    assert!(!people.changed());
    assert!(people.get(&"alice".to_string()).unwrap().changed());

    rollback_deep(&mut people).unwrap();
    assert_eq!(people.get(&"alice".to_string()).unwrap().age(), 30);
}
