//! Tracked ordered set.

use super::{
    apply_change_set_to, attach_default, clear_tracked, enforce, rollback_change_set_to,
    rollback_tracked, tracked_change_set, tracked_has_change, Element, Trackable, Tracked,
};
use crate::change::{to_value, ChangeSet};
use crate::error::TrackError;
use crate::registry::Shape;
use crate::tracker::SetTracker;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::btree_set;
use std::collections::BTreeSet;

/// Set whose membership changes are recorded by a [`SetTracker`]
///
/// Sets have no addressable children.
#[derive(Debug)]
pub struct TrackableSet<T> {
    items: BTreeSet<T>,
    tracker: Option<SetTracker<T>>,
}

impl<T> Default for TrackableSet<T> {
    fn default() -> Self {
        Self {
            items: BTreeSet::new(),
            tracker: None,
        }
    }
}

impl<T: Element + Ord> TrackableSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_set(items: BTreeSet<T>) -> Self {
        Self {
            items,
            tracker: None,
        }
    }

    /// Add a member; returns false and records nothing when already present
    pub fn insert(&mut self, value: T) -> bool {
        if self.items.contains(&value) {
            return false;
        }
        if let Some(tracker) = self.tracker.as_mut() {
            enforce(tracker.track_add(value.clone()));
        }
        self.items.insert(value)
    }

    /// Remove a member; returns false and records nothing when absent
    pub fn remove(&mut self, value: &T) -> bool {
        let Some(old) = self.items.take(value) else {
            return false;
        };
        if let Some(tracker) = self.tracker.as_mut() {
            enforce(tracker.track_remove(old));
        }
        true
    }

    pub fn clear(&mut self) {
        let items = std::mem::take(&mut self.items);
        if let Some(tracker) = self.tracker.as_mut() {
            for value in items {
                enforce(tracker.track_remove(value));
            }
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.items.contains(value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_set(&self) -> &BTreeSet<T> {
        &self.items
    }

    pub fn into_set(self) -> BTreeSet<T> {
        self.items
    }
}

impl<T: Clone> Clone for TrackableSet<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            tracker: None,
        }
    }
}

impl<T: PartialEq> PartialEq for TrackableSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Element + Ord> FromIterator<T> for TrackableSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_set(iter.into_iter().collect())
    }
}

impl<T: Serialize> Serialize for TrackableSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de> + Ord> Deserialize<'de> for TrackableSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = BTreeSet::deserialize(deserializer)?;
        Ok(Self {
            items,
            tracker: None,
        })
    }
}

impl<T: Element + Ord> Element for TrackableSet<T> {
    fn as_trackable(&self) -> Option<&dyn Trackable> {
        Some(self)
    }

    fn as_trackable_mut(&mut self) -> Option<&mut dyn Trackable> {
        Some(self)
    }
}

impl<T: Element + Ord> Tracked for TrackableSet<T> {
    type Tracker = SetTracker<T>;

    fn tracker(&self) -> Option<&Self::Tracker> {
        self.tracker.as_ref()
    }

    fn tracker_mut(&mut self) -> Option<&mut Self::Tracker> {
        self.tracker.as_mut()
    }

    fn replace_tracker(&mut self, tracker: Option<Self::Tracker>) -> Option<Self::Tracker> {
        std::mem::replace(&mut self.tracker, tracker)
    }
}

impl<T: Element + Ord> Trackable for TrackableSet<T> {
    fn shape(&self) -> Shape {
        Shape::Set
    }

    fn is_tracked(&self) -> bool {
        self.tracker.is_some()
    }

    fn has_own_change(&self) -> bool {
        tracked_has_change(self)
    }

    fn set_default_tracker(&mut self) {
        attach_default(self)
    }

    fn detach_tracker(&mut self) {
        self.tracker = None;
    }

    fn clear_changes(&mut self) {
        clear_tracked(self)
    }

    fn rollback(&mut self) -> Result<(), TrackError> {
        rollback_tracked(self)
    }

    fn change_set(&self) -> Result<Option<ChangeSet>, TrackError> {
        tracked_change_set(self)
    }

    fn apply_change_set(&mut self, change_set: &ChangeSet) -> Result<(), TrackError> {
        apply_change_set_to(self, change_set)
    }

    fn rollback_change_set(&mut self, change_set: &ChangeSet) -> Result<(), TrackError> {
        rollback_change_set_to(self, change_set)
    }

    fn child_trackable(&self, _name: &str) -> Option<&dyn Trackable> {
        None
    }

    fn child_trackable_mut(&mut self, _name: &str) -> Option<&mut dyn Trackable> {
        None
    }

    fn child_trackables(&self, _changed_only: bool) -> Vec<(String, &dyn Trackable)> {
        Vec::new()
    }

    fn child_trackables_mut(&mut self) -> Vec<(String, &mut dyn Trackable)> {
        Vec::new()
    }

    fn to_value(&self) -> Result<Value, TrackError> {
        to_value(&self.items)
    }
}
