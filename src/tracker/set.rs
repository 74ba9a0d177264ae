//! Set membership tracking.

use super::{invalid_transition, ChangeNotifier, Tracker};
use crate::change::{from_value, to_value, ChangeSet, SetOperation};
use crate::error::TrackError;
use crate::registry::Shape;
use crate::trackable::{Element, TrackableSet};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Tracker of a [`TrackableSet`]
///
/// An add followed by a remove of the same member (or the reverse) cancels out.
/// Repeating the same operation on a member is an invalid transition.
#[derive(Debug)]
pub struct SetTracker<T> {
    changes: BTreeMap<T, SetOperation>,
    notifier: ChangeNotifier,
}

impl<T> Default for SetTracker<T> {
    fn default() -> Self {
        Self {
            changes: BTreeMap::new(),
            notifier: ChangeNotifier::new(),
        }
    }
}

impl<T: Element + Ord> SetTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> &BTreeMap<T, SetOperation> {
        &self.changes
    }

    /// Members recorded as added
    pub fn added(&self) -> impl Iterator<Item = &T> {
        self.members(SetOperation::Add)
    }

    /// Members recorded as removed
    pub fn removed(&self) -> impl Iterator<Item = &T> {
        self.members(SetOperation::Remove)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn track_add(&mut self, value: T) -> Result<(), TrackError> {
        self.track(value, SetOperation::Add)
    }

    pub fn track_remove(&mut self, value: T) -> Result<(), TrackError> {
        self.track(value, SetOperation::Remove)
    }

    fn track(&mut self, value: T, op: SetOperation) -> Result<(), TrackError> {
        let had_change = !self.changes.is_empty();
        match self.changes.entry(value) {
            Entry::Vacant(slot) => {
                slot.insert(op);
            }
            Entry::Occupied(slot) => {
                if *slot.get() == op {
                    return Err(invalid_transition(slot.key(), op.as_str(), op.as_str()));
                }
                slot.remove();
            }
        }
        self.notifier.transition(had_change, !self.changes.is_empty());
        Ok(())
    }

    fn members(&self, op: SetOperation) -> impl Iterator<Item = &T> {
        self.changes
            .iter()
            .filter(move |(_, recorded)| **recorded == op)
            .map(|(value, _)| value)
    }
}

impl<T: Element + Ord> Tracker for SetTracker<T> {
    type Target = TrackableSet<T>;

    fn has_change(&self) -> bool {
        !self.changes.is_empty()
    }

    fn clear(&mut self) {
        self.changes.clear();
    }

    fn apply_to(&self, target: &mut Self::Target) -> Result<(), TrackError> {
        for (value, op) in &self.changes {
            match op {
                SetOperation::Add => target.insert(value.clone()),
                SetOperation::Remove => target.remove(value),
            };
        }
        Ok(())
    }

    fn apply_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError> {
        for (value, op) in &self.changes {
            tracker.track(value.clone(), *op)?;
        }
        Ok(())
    }

    fn rollback_to(&self, target: &mut Self::Target) -> Result<(), TrackError> {
        for (value, op) in &self.changes {
            match op {
                SetOperation::Add => target.remove(value),
                SetOperation::Remove => target.insert(value.clone()),
            };
        }
        Ok(())
    }

    fn rollback_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError> {
        for (value, op) in &self.changes {
            let inverse = match op {
                SetOperation::Add => SetOperation::Remove,
                SetOperation::Remove => SetOperation::Add,
            };
            tracker.track(value.clone(), inverse)?;
        }
        Ok(())
    }

    fn to_change_set(&self) -> Result<ChangeSet, TrackError> {
        let changes = self
            .changes
            .iter()
            .map(|(value, op)| Ok((to_value(value)?, *op)))
            .collect::<Result<Vec<_>, TrackError>>()?;
        Ok(ChangeSet::Set(changes))
    }

    fn from_change_set(change_set: &ChangeSet) -> Result<Self, TrackError> {
        let ChangeSet::Set(changes) = change_set else {
            return Err(change_set.mismatch(Shape::Set));
        };
        let mut tracker = Self::default();
        for (value, op) in changes {
            tracker.changes.insert(from_value(value.clone())?, *op);
        }
        Ok(tracker)
    }

    fn notifier_mut(&mut self) -> &mut ChangeNotifier {
        &mut self.notifier
    }
}
