//! Ordered list change log.

use super::{ChangeNotifier, Tracker};
use crate::change::{from_value, to_value, ChangeSet, ListChange, ListOperation};
use crate::error::TrackError;
use crate::registry::Shape;
use crate::trackable::{Element, TrackableList};

/// Tracker of a [`TrackableList`]
///
/// Position-dependent operations do not commute, so entries are appended in the
/// order they happen and never merged.
#[derive(Debug)]
pub struct ListTracker<T> {
    log: Vec<ListChange<T>>,
    notifier: ChangeNotifier,
}

impl<T> Default for ListTracker<T> {
    fn default() -> Self {
        Self {
            log: Vec::new(),
            notifier: ChangeNotifier::new(),
        }
    }
}

impl<T: Element> ListTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &[ListChange<T>] {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn track_insert(&mut self, index: usize, new: T) {
        self.push(ListChange::new(ListOperation::Insert, index, None, Some(new)));
    }

    pub fn track_remove(&mut self, index: usize, old: T) {
        self.push(ListChange::new(ListOperation::Remove, index, Some(old), None));
    }

    pub fn track_modify(&mut self, index: usize, old: T, new: T) {
        self.push(ListChange::new(ListOperation::Modify, index, Some(old), Some(new)));
    }

    pub fn track_push_front(&mut self, new: T) {
        self.push(ListChange::new(ListOperation::PushFront, 0, None, Some(new)));
    }

    /// `index` is the position the value landed at
    pub fn track_push_back(&mut self, index: usize, new: T) {
        self.push(ListChange::new(ListOperation::PushBack, index, None, Some(new)));
    }

    pub fn track_pop_front(&mut self, old: T) {
        self.push(ListChange::new(ListOperation::PopFront, 0, Some(old), None));
    }

    /// `index` is the position the value was taken from
    pub fn track_pop_back(&mut self, index: usize, old: T) {
        self.push(ListChange::new(ListOperation::PopBack, index, Some(old), None));
    }

    fn push(&mut self, change: ListChange<T>) {
        let had_change = !self.log.is_empty();
        self.log.push(change);
        self.notifier.transition(had_change, true);
    }
}

fn value_of<T: Clone>(side: &Option<T>, op: ListOperation) -> Result<T, TrackError> {
    side.clone()
        .ok_or_else(|| TrackError::UnknownPath(format!("{} entry without value", op.as_str())))
}

fn check_index(index: usize, len: usize) -> Result<(), TrackError> {
    if index > len {
        return Err(TrackError::IndexOutOfRange { index, len });
    }
    Ok(())
}

fn check_element(index: usize, len: usize) -> Result<(), TrackError> {
    if index >= len {
        return Err(TrackError::IndexOutOfRange { index, len });
    }
    Ok(())
}

impl<T: Element> Tracker for ListTracker<T> {
    type Target = TrackableList<T>;

    fn has_change(&self) -> bool {
        !self.log.is_empty()
    }

    fn clear(&mut self) {
        self.log.clear();
    }

    fn apply_to(&self, target: &mut Self::Target) -> Result<(), TrackError> {
        for change in &self.log {
            match change.op {
                ListOperation::Insert => {
                    check_index(change.index, target.len())?;
                    target.insert(change.index, value_of(&change.new, change.op)?);
                }
                ListOperation::Remove => {
                    check_element(change.index, target.len())?;
                    target.remove_at(change.index);
                }
                ListOperation::Modify => {
                    check_element(change.index, target.len())?;
                    target.set(change.index, value_of(&change.new, change.op)?);
                }
                ListOperation::PushFront => target.push_front(value_of(&change.new, change.op)?),
                ListOperation::PushBack => target.push_back(value_of(&change.new, change.op)?),
                ListOperation::PopFront => {
                    target.pop_front().ok_or(TrackError::IndexOutOfRange { index: 0, len: 0 })?;
                }
                ListOperation::PopBack => {
                    target.pop_back().ok_or(TrackError::IndexOutOfRange { index: 0, len: 0 })?;
                }
            }
        }
        Ok(())
    }

    fn apply_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError> {
        for change in &self.log {
            tracker.push(change.clone());
        }
        Ok(())
    }

    fn rollback_to(&self, target: &mut Self::Target) -> Result<(), TrackError> {
        for change in self.log.iter().rev() {
            match change.op {
                ListOperation::Insert => {
                    check_element(change.index, target.len())?;
                    target.remove_at(change.index);
                }
                ListOperation::Remove => {
                    check_index(change.index, target.len())?;
                    target.insert(change.index, value_of(&change.old, change.op)?);
                }
                ListOperation::Modify => {
                    check_element(change.index, target.len())?;
                    target.set(change.index, value_of(&change.old, change.op)?);
                }
                ListOperation::PushFront => {
                    target.pop_front().ok_or(TrackError::IndexOutOfRange { index: 0, len: 0 })?;
                }
                ListOperation::PushBack => {
                    target.pop_back().ok_or(TrackError::IndexOutOfRange { index: 0, len: 0 })?;
                }
                ListOperation::PopFront => target.push_front(value_of(&change.old, change.op)?),
                ListOperation::PopBack => target.push_back(value_of(&change.old, change.op)?),
            }
        }
        Ok(())
    }

    fn rollback_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError> {
        for change in self.log.iter().rev() {
            let inverse = match change.op {
                ListOperation::Insert => ListOperation::Remove,
                ListOperation::Remove => ListOperation::Insert,
                ListOperation::Modify => ListOperation::Modify,
                ListOperation::PushFront => ListOperation::PopFront,
                ListOperation::PushBack => ListOperation::PopBack,
                ListOperation::PopFront => ListOperation::PushFront,
                ListOperation::PopBack => ListOperation::PushBack,
            };
            tracker.push(ListChange::new(
                inverse,
                change.index,
                change.new.clone(),
                change.old.clone(),
            ));
        }
        Ok(())
    }

    fn to_change_set(&self) -> Result<ChangeSet, TrackError> {
        let log = self
            .log
            .iter()
            .map(|change| change.clone().map(|v| to_value(&v)))
            .collect::<Result<Vec<_>, TrackError>>()?;
        Ok(ChangeSet::List(log))
    }

    fn from_change_set(change_set: &ChangeSet) -> Result<Self, TrackError> {
        let ChangeSet::List(log) = change_set else {
            return Err(change_set.mismatch(Shape::List));
        };
        let log = log
            .iter()
            .map(|change| change.clone().map(from_value))
            .collect::<Result<Vec<_>, TrackError>>()?;
        Ok(Self {
            log,
            notifier: ChangeNotifier::new(),
        })
    }

    fn notifier_mut(&mut self) -> &mut ChangeNotifier {
        &mut self.notifier
    }
}
