//! Tracked ordered map.

use super::{
    apply_change_set_to, attach_default, clear_tracked, enforce, pristine, rollback_change_set_to,
    rollback_tracked, tracked_change_set, tracked_has_change, Element, MapKey, Trackable, Tracked,
};
use crate::change::{to_value, ChangeSet};
use crate::error::TrackError;
use crate::registry::Shape;
use crate::tracker::DictionaryTracker;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Map whose inserts and removals are recorded by a [`DictionaryTracker`]
///
/// # Panics
///
/// Mutation methods panic if an attached tracker has diverged from the map
/// (for example a foreign tracker recording an add for a key it already holds
/// as added). This cannot happen when the map is only mutated through its own
/// methods.
#[derive(Debug)]
pub struct TrackableDictionary<K, V> {
    map: BTreeMap<K, V>,
    tracker: Option<DictionaryTracker<K, V>>,
}

impl<K, V> Default for TrackableDictionary<K, V> {
    fn default() -> Self {
        Self {
            map: BTreeMap::new(),
            tracker: None,
        }
    }
}

impl<K: MapKey, V: Element> TrackableDictionary<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Untracked dictionary holding `map`
    pub fn from_map(map: BTreeMap<K, V>) -> Self {
        Self { map, tracker: None }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    /// Insert or replace an entry, recording an add or a modify
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.tracker.as_mut() {
            Some(tracker) => {
                let old = self.map.insert(key.clone(), value.clone());
                match &old {
                    Some(old) => enforce(tracker.track_modify(key, pristine(old), value)),
                    None => enforce(tracker.track_add(key, value)),
                }
                old
            }
            None => self.map.insert(key, value),
        }
    }

    /// Remove an entry, recording a remove when it was present
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let old = self.map.remove(key)?;
        if let Some(tracker) = self.tracker.as_mut() {
            enforce(tracker.track_remove(key.clone(), pristine(&old)));
        }
        Some(old)
    }

    /// Remove every entry, recording one remove per entry
    pub fn clear(&mut self) {
        let map = std::mem::take(&mut self.map);
        if let Some(tracker) = self.tracker.as_mut() {
            for (key, old) in map {
                enforce(tracker.track_remove(key, pristine(&old)));
            }
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, K, V> {
        self.map.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, K, V> {
        self.map.keys()
    }

    pub fn values(&self) -> btree_map::Values<'_, K, V> {
        self.map.values()
    }

    pub fn as_map(&self) -> &BTreeMap<K, V> {
        &self.map
    }

    pub fn into_map(self) -> BTreeMap<K, V> {
        self.map
    }
}

impl<K: MapKey, V: Element + Trackable> TrackableDictionary<K, V> {
    /// Mutable access to a trackable value; the value records its own changes
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.map.get_mut(key)
    }
}

impl<K: Clone, V: Clone> Clone for TrackableDictionary<K, V> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            tracker: None,
        }
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for TrackableDictionary<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<K: MapKey, V: Element> FromIterator<(K, V)> for TrackableDictionary<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl<'a, K, V> IntoIterator for &'a TrackableDictionary<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = btree_map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}

impl<K: Serialize, V: Serialize> Serialize for TrackableDictionary<K, V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.map.serialize(serializer)
    }
}

impl<'de, K, V> Deserialize<'de> for TrackableDictionary<K, V>
where
    K: Deserialize<'de> + Ord,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = BTreeMap::deserialize(deserializer)?;
        Ok(Self { map, tracker: None })
    }
}

impl<K: MapKey, V: Element> Element for TrackableDictionary<K, V> {
    fn as_trackable(&self) -> Option<&dyn Trackable> {
        Some(self)
    }

    fn as_trackable_mut(&mut self) -> Option<&mut dyn Trackable> {
        Some(self)
    }
}

impl<K: MapKey, V: Element> Tracked for TrackableDictionary<K, V> {
    type Tracker = DictionaryTracker<K, V>;

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

impl<K: MapKey, V: Element> Trackable for TrackableDictionary<K, V> {
    fn shape(&self) -> Shape {
        Shape::Dictionary
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
        let key = name.parse::<K>().ok()?;
        self.map.get(&key)?.as_trackable()
    }

    fn child_trackable_mut(&mut self, name: &str) -> Option<&mut dyn Trackable> {
        let key = name.parse::<K>().ok()?;
        self.map.get_mut(&key)?.as_trackable_mut()
    }

    fn child_trackables(&self, changed_only: bool) -> Vec<(String, &dyn Trackable)> {
        self.map
            .iter()
            .filter_map(|(key, value)| value.as_trackable().map(|child| (key.to_string(), child)))
            .filter(|(_, child)| !changed_only || child.changed())
            .collect()
    }

    fn child_trackables_mut(&mut self) -> Vec<(String, &mut dyn Trackable)> {
        self.map
            .iter_mut()
            .filter_map(|(key, value)| {
                value
                    .as_trackable_mut()
                    .map(|child| (key.to_string(), child))
            })
            .collect()
    }

    fn to_value(&self) -> Result<Value, TrackError> {
        to_value(&self.map)
    }
}
