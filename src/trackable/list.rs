//! Tracked ordered list.

use super::{
    apply_change_set_to, attach_default, clear_tracked, pristine, rollback_change_set_to,
    rollback_tracked, tracked_change_set, tracked_has_change, Element, Trackable, Tracked,
};
use crate::change::{to_value, ChangeSet};
use crate::error::TrackError;
use crate::registry::Shape;
use crate::tracker::ListTracker;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// List whose mutations are appended to a [`ListTracker`] log
///
/// Mutations at either end are recorded as push/pop entries; the end is checked
/// before the front, so inserting into an empty list records a push to the back.
///
/// # Panics
///
/// Index-based methods panic when the index is out of range, like `Vec`.
#[derive(Debug)]
pub struct TrackableList<T> {
    items: Vec<T>,
    tracker: Option<ListTracker<T>>,
}

impl<T> Default for TrackableList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            tracker: None,
        }
    }
}

impl<T: Element> TrackableList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Untracked list holding `items`
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            items,
            tracker: None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Replace the element at `index`, returning the previous one
    pub fn set(&mut self, index: usize, value: T) -> T {
        let old = std::mem::replace(&mut self.items[index], value);
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.track_modify(index, pristine(&old), self.items[index].clone());
        }
        old
    }

    pub fn insert(&mut self, index: usize, value: T) {
        let len = self.items.len();
        assert!(index <= len, "insertion index (is {index}) should be <= len (is {len})");
        if let Some(tracker) = self.tracker.as_mut() {
            if index == len {
                tracker.track_push_back(index, value.clone());
            } else if index == 0 {
                tracker.track_push_front(value.clone());
            } else {
                tracker.track_insert(index, value.clone());
            }
        }
        self.items.insert(index, value);
    }

    pub fn remove_at(&mut self, index: usize) -> T {
        let len = self.items.len();
        assert!(index < len, "removal index (is {index}) should be < len (is {len})");
        let old = self.items.remove(index);
        if let Some(tracker) = self.tracker.as_mut() {
            if index == len - 1 {
                tracker.track_pop_back(index, pristine(&old));
            } else if index == 0 {
                tracker.track_pop_front(pristine(&old));
            } else {
                tracker.track_remove(index, pristine(&old));
            }
        }
        old
    }

    pub fn push_back(&mut self, value: T) {
        self.insert(self.items.len(), value);
    }

    pub fn push_front(&mut self, value: T) {
        self.insert(0, value);
    }

    pub fn pop_back(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.remove_at(self.items.len() - 1))
    }

    pub fn pop_front(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.remove_at(0))
    }

    /// Remove the first element equal to `value`
    pub fn remove(&mut self, value: &T) -> bool {
        match self.items.iter().position(|item| item == value) {
            Some(index) => {
                self.remove_at(index);
                true
            }
            None => false,
        }
    }

    /// Remove every element from the back, recording one pop per element
    pub fn clear(&mut self) {
        while self.pop_back().is_some() {}
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

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Element + Trackable> TrackableList<T> {
    /// Mutable access to a trackable element; the element records its own changes
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }
}

impl<T: Clone> Clone for TrackableList<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            tracker: None,
        }
    }
}

impl<T: PartialEq> PartialEq for TrackableList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Element> FromIterator<T> for TrackableList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a TrackableList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for TrackableList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for TrackableList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let items = Vec::deserialize(deserializer)?;
        Ok(Self {
            items,
            tracker: None,
        })
    }
}

impl<T: Element> Element for TrackableList<T> {
    fn as_trackable(&self) -> Option<&dyn Trackable> {
        Some(self)
    }

    fn as_trackable_mut(&mut self) -> Option<&mut dyn Trackable> {
        Some(self)
    }
}

impl<T: Element> Tracked for TrackableList<T> {
    type Tracker = ListTracker<T>;

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

impl<T: Element> Trackable for TrackableList<T> {
    fn shape(&self) -> Shape {
        Shape::List
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

    fn child_trackable(&self, name: &str) -> Option<&dyn Trackable> {
        let index = name.parse::<usize>().ok()?;
        self.items.get(index)?.as_trackable()
    }

    fn child_trackable_mut(&mut self, name: &str) -> Option<&mut dyn Trackable> {
        let index = name.parse::<usize>().ok()?;
        self.items.get_mut(index)?.as_trackable_mut()
    }

    fn child_trackables(&self, changed_only: bool) -> Vec<(String, &dyn Trackable)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| item.as_trackable().map(|child| (index.to_string(), child)))
            .filter(|(_, child)| !changed_only || child.changed())
            .collect()
    }

    fn child_trackables_mut(&mut self) -> Vec<(String, &mut dyn Trackable)> {
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(|(index, item)| {
                item.as_trackable_mut().map(|child| (index.to_string(), child))
            })
            .collect()
    }

    fn to_value(&self) -> Result<Value, TrackError> {
        to_value(&self.items)
    }
}
