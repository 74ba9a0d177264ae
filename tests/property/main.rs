//! Property-based tests for tracker laws
//!
//! Random mutation sequences are run against tracked collections and checked
//! against a plain std model of the same values.

use proptest::prelude::*;
use proptest::test_runner::TestRunner;
use std::collections::BTreeSet;
use trackable::{
    DictionaryOperation, Trackable, TrackableDictionary, TrackableList, TrackableSet, Tracked,
};

#[derive(Debug, Clone)]
enum MapOp {
    Insert(i32, String),
    Remove(i32),
}

fn map_op() -> impl Strategy<Value = MapOp> {
    prop_oneof![
        (0..6i32, "[a-c]{1,2}").prop_map(|(k, v)| MapOp::Insert(k, v)),
        (0..6i32).prop_map(MapOp::Remove),
    ]
}

fn run_map_ops(map: &mut TrackableDictionary<i32, String>, ops: &[MapOp]) {
    for op in ops {
        match op {
            MapOp::Insert(k, v) => {
                map.insert(*k, v.clone());
            }
            MapOp::Remove(k) => {
                map.remove(k);
            }
        }
    }
}

#[derive(Debug, Clone)]
enum ListOp {
    PushBack(i32),
    PushFront(i32),
    PopBack,
    PopFront,
    Insert(usize, i32),
    RemoveAt(usize),
    Set(usize, i32),
}

fn list_op() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        any::<i32>().prop_map(ListOp::PushBack),
        any::<i32>().prop_map(ListOp::PushFront),
        Just(ListOp::PopBack),
        Just(ListOp::PopFront),
        (0..8usize, any::<i32>()).prop_map(|(i, v)| ListOp::Insert(i, v)),
        (0..8usize).prop_map(ListOp::RemoveAt),
        (0..8usize, any::<i32>()).prop_map(|(i, v)| ListOp::Set(i, v)),
    ]
}

fn run_list_ops(list: &mut TrackableList<i32>, ops: &[ListOp]) {
    for op in ops {
        let len = list.len();
        match *op {
            ListOp::PushBack(v) => list.push_back(v),
            ListOp::PushFront(v) => list.push_front(v),
            ListOp::PopBack if len > 0 => {
                list.pop_back();
            }
            ListOp::PopFront if len > 0 => {
                list.pop_front();
            }
            ListOp::Insert(i, v) => list.insert(i % (len + 1), v),
            ListOp::RemoveAt(i) if len > 0 => {
                list.remove_at(i % len);
            }
            ListOp::Set(i, v) if len > 0 => {
                list.set(i % len, v);
            }
            _ => {}
        }
    }
}

/// Each recorded change spans exactly the initial and the final value of its key
#[test]
fn test_dictionary_merge_matches_reference() {
    let mut runner = TestRunner::default();

    runner
        .run(
            &(
                prop::collection::btree_map(0..6i32, "[a-c]{1,2}", 0..6),
                prop::collection::vec(map_op(), 0..24),
            ),
            |(initial, ops)| {
                let mut map = TrackableDictionary::from_map(initial.clone());
                map.set_default_tracker();
                run_map_ops(&mut map, &ops);

                let tracker = map.tracker().unwrap();
                for key in 0..6 {
                    let before = initial.get(&key);
                    let after = map.get(&key);
                    match tracker.get(&key) {
                        None => prop_assert_eq!(before, after),
                        Some(change) => {
                            prop_assert_eq!(change.old.as_ref(), before);
                            prop_assert_eq!(change.new.as_ref(), after);
                            let expected = match (before, after) {
                                (None, Some(_)) => DictionaryOperation::Add,
                                (Some(_), None) => DictionaryOperation::Remove,
                                _ => DictionaryOperation::Modify,
                            };
                            prop_assert_eq!(change.op, expected);
                        }
                    }
                }
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_dictionary_replay_and_rollback_are_inverse() {
    let mut runner = TestRunner::default();

    runner
        .run(
            &(
                prop::collection::btree_map(0..6i32, "[a-c]{1,2}", 0..6),
                prop::collection::vec(map_op(), 0..24),
            ),
            |(initial, ops)| {
                let mut map = TrackableDictionary::from_map(initial.clone());
                map.set_default_tracker();
                run_map_ops(&mut map, &ops);
                let change_set = map.change_set().unwrap().unwrap();

                let mut replica = TrackableDictionary::from_map(initial.clone());
                replica.apply_change_set(&change_set).unwrap();
                prop_assert_eq!(replica.as_map(), map.as_map());
                replica.rollback_change_set(&change_set).unwrap();
                prop_assert_eq!(replica.as_map(), &initial);

                map.rollback().unwrap();
                prop_assert_eq!(map.as_map(), &initial);
                prop_assert!(!map.changed());
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_list_replay_and_rollback_are_inverse() {
    let mut runner = TestRunner::default();

    runner
        .run(
            &(
                prop::collection::vec(any::<i32>(), 0..6),
                prop::collection::vec(list_op(), 0..24),
            ),
            |(initial, ops)| {
                let mut list = TrackableList::from_vec(initial.clone());
                list.set_default_tracker();
                run_list_ops(&mut list, &ops);
                let change_set = list.change_set().unwrap().unwrap();

                let mut replica = TrackableList::from_vec(initial.clone());
                replica.apply_change_set(&change_set).unwrap();
                prop_assert_eq!(replica.as_slice(), list.as_slice());
                replica.rollback_change_set(&change_set).unwrap();
                prop_assert_eq!(replica.as_slice(), initial.as_slice());

                list.rollback().unwrap();
                prop_assert_eq!(list.as_slice(), initial.as_slice());
                prop_assert!(!list.changed());
                Ok(())
            },
        )
        .unwrap();
}

/// Net membership change only: the tracker never holds a member whose presence is unchanged
#[test]
fn test_set_tracks_net_membership() {
    let mut runner = TestRunner::default();

    runner
        .run(
            &(
                prop::collection::btree_set(0..6i32, 0..6),
                prop::collection::vec((any::<bool>(), 0..6i32), 0..24),
            ),
            |(initial, ops)| {
                let mut set = TrackableSet::from_set(initial.clone());
                set.set_default_tracker();
                let mut model: BTreeSet<i32> = initial.clone();
                for (add, member) in &ops {
                    if *add {
                        set.insert(*member);
                        model.insert(*member);
                    } else {
                        set.remove(member);
                        model.remove(member);
                    }
                }
                prop_assert_eq!(set.as_set(), &model);
                prop_assert_eq!(set.changed(), model != initial);

                let change_set = set.change_set().unwrap().unwrap();
                prop_assert_eq!(change_set.len(), initial.symmetric_difference(&model).count());

                let mut replica = TrackableSet::from_set(initial.clone());
                replica.apply_change_set(&change_set).unwrap();
                prop_assert_eq!(replica.as_set(), &model);

                set.rollback().unwrap();
                prop_assert_eq!(set.as_set(), &initial);
                Ok(())
            },
        )
        .unwrap();
}
