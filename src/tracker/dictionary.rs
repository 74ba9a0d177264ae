//! Dictionary change tracking with per-key merge.

use super::{invalid_transition, ChangeNotifier, Tracker};
use crate::change::{from_value, to_value, ChangeSet, DictionaryChange, DictionaryOperation};
use crate::error::TrackError;
use crate::registry::Shape;
use crate::trackable::{Element, MapKey, TrackableDictionary};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Tracker of a [`TrackableDictionary`]
///
/// Holds at most one merged change per key:
///
/// | prior  | add             | remove          | modify                |
/// |--------|-----------------|-----------------|-----------------------|
/// | none   | Add(new)        | Remove(old)     | Modify(old, new)      |
/// | Add    | error           | cancel          | Add(new)              |
/// | Remove | Modify(old,new) | error           | error                 |
/// | Modify | error           | Remove(old)     | Modify(old, new)      |
#[derive(Debug)]
pub struct DictionaryTracker<K, V> {
    changes: BTreeMap<K, DictionaryChange<V>>,
    notifier: ChangeNotifier,
}

impl<K, V> Default for DictionaryTracker<K, V> {
    fn default() -> Self {
        Self {
            changes: BTreeMap::new(),
            notifier: ChangeNotifier::new(),
        }
    }
}

impl<K: MapKey, V: Element> DictionaryTracker<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> &BTreeMap<K, DictionaryChange<V>> {
        &self.changes
    }

    pub fn get(&self, key: &K) -> Option<&DictionaryChange<V>> {
        self.changes.get(key)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn track_add(&mut self, key: K, new: V) -> Result<(), TrackError> {
        let had_change = !self.changes.is_empty();
        match self.changes.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(DictionaryChange::add(new));
            }
            Entry::Occupied(mut slot) => {
                let change = slot.get_mut();
                match change.op {
                    DictionaryOperation::Remove => {
                        change.op = DictionaryOperation::Modify;
                        change.new = Some(new);
                    }
                    prior => return Err(invalid_transition(slot.key(), prior.as_str(), "add")),
                }
            }
        }
        self.notifier.transition(had_change, true);
        Ok(())
    }

    pub fn track_remove(&mut self, key: K, old: V) -> Result<(), TrackError> {
        let had_change = !self.changes.is_empty();
        match self.changes.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(DictionaryChange::remove(old));
            }
            Entry::Occupied(mut slot) => match slot.get().op {
                DictionaryOperation::Add => {
                    slot.remove();
                }
                DictionaryOperation::Modify => {
                    let change = slot.get_mut();
                    change.op = DictionaryOperation::Remove;
                    change.new = None;
                }
                DictionaryOperation::Remove => {
                    return Err(invalid_transition(slot.key(), "remove", "remove"))
                }
            },
        }
        self.notifier.transition(had_change, !self.changes.is_empty());
        Ok(())
    }

    pub fn track_modify(&mut self, key: K, old: V, new: V) -> Result<(), TrackError> {
        let had_change = !self.changes.is_empty();
        match self.changes.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(DictionaryChange::modify(old, new));
            }
            Entry::Occupied(mut slot) => {
                let change = slot.get_mut();
                match change.op {
                    DictionaryOperation::Add | DictionaryOperation::Modify => {
                        change.new = Some(new);
                    }
                    DictionaryOperation::Remove => {
                        return Err(invalid_transition(slot.key(), "remove", "modify"))
                    }
                }
            }
        }
        self.notifier.transition(had_change, true);
        Ok(())
    }
}

fn missing(key: &impl std::fmt::Debug, side: &'static str) -> TrackError {
    TrackError::UnknownPath(format!("{:?} has no {} value", key, side))
}

impl<K: MapKey, V: Element> Tracker for DictionaryTracker<K, V> {
    type Target = TrackableDictionary<K, V>;

    fn has_change(&self) -> bool {
        !self.changes.is_empty()
    }

    fn clear(&mut self) {
        self.changes.clear();
    }

    fn apply_to(&self, target: &mut Self::Target) -> Result<(), TrackError> {
        for (key, change) in &self.changes {
            match change.op {
                DictionaryOperation::Add | DictionaryOperation::Modify => {
                    let new = change.new.clone().ok_or_else(|| missing(key, "new"))?;
                    target.insert(key.clone(), new);
                }
                DictionaryOperation::Remove => {
                    target.remove(key);
                }
            }
        }
        Ok(())
    }

    fn apply_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError> {
        for (key, change) in &self.changes {
            match (change.op, change.old.clone(), change.new.clone()) {
                (DictionaryOperation::Add, _, Some(new)) => tracker.track_add(key.clone(), new)?,
                (DictionaryOperation::Remove, Some(old), _) => {
                    tracker.track_remove(key.clone(), old)?
                }
                (DictionaryOperation::Modify, Some(old), Some(new)) => {
                    tracker.track_modify(key.clone(), old, new)?
                }
                _ => return Err(missing(key, "recorded")),
            }
        }
        Ok(())
    }

    fn rollback_to(&self, target: &mut Self::Target) -> Result<(), TrackError> {
        for (key, change) in &self.changes {
            match change.op {
                DictionaryOperation::Add => {
                    target.remove(key);
                }
                DictionaryOperation::Remove | DictionaryOperation::Modify => {
                    let old = change.old.clone().ok_or_else(|| missing(key, "old"))?;
                    target.insert(key.clone(), old);
                }
            }
        }
        Ok(())
    }

    fn rollback_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError> {
        for (key, change) in &self.changes {
            match (change.op, change.old.clone(), change.new.clone()) {
                (DictionaryOperation::Add, _, Some(new)) => tracker.track_remove(key.clone(), new)?,
                (DictionaryOperation::Remove, Some(old), _) => tracker.track_add(key.clone(), old)?,
                (DictionaryOperation::Modify, Some(old), Some(new)) => {
                    tracker.track_modify(key.clone(), new, old)?
                }
                _ => return Err(missing(key, "recorded")),
            }
        }
        Ok(())
    }

    fn to_change_set(&self) -> Result<ChangeSet, TrackError> {
        let changes = self
            .changes
            .iter()
            .map(|(key, change)| Ok((to_value(key)?, change.clone().map(|v| to_value(&v))?)))
            .collect::<Result<Vec<_>, TrackError>>()?;
        Ok(ChangeSet::Dictionary(changes))
    }

    fn from_change_set(change_set: &ChangeSet) -> Result<Self, TrackError> {
        let ChangeSet::Dictionary(changes) = change_set else {
            return Err(change_set.mismatch(Shape::Dictionary));
        };
        let mut tracker = Self::default();
        for (key, change) in changes {
            let key: K = from_value(key.clone())?;
            tracker.changes.insert(key, change.clone().map(from_value)?);
        }
        Ok(tracker)
    }

    fn notifier_mut(&mut self) -> &mut ChangeNotifier {
        &mut self.notifier
    }
}
