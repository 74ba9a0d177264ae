//! Field-level tracking for Poco records.

use super::{ChangeNotifier, Tracker};
use crate::change::{to_value, ChangeSet, FieldChange};
use crate::error::TrackError;
use crate::registry::Shape;
use crate::trackable::Poco;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

/// Tracker of a [`Poco`] value
///
/// The first set of a field records `{old, new}`; later sets keep the original
/// `old` and overwrite `new`. Entries keep the order fields were first changed in.
pub struct PocoTracker<P> {
    changes: Vec<(String, FieldChange<Value>)>,
    notifier: ChangeNotifier,
    _target: PhantomData<fn() -> P>,
}

impl<P> Default for PocoTracker<P> {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
            notifier: ChangeNotifier::new(),
            _target: PhantomData,
        }
    }
}

impl<P> fmt::Debug for PocoTracker<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PocoTracker")
            .field("changes", &self.changes)
            .finish()
    }
}

impl<P> PocoTracker<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> &[(String, FieldChange<Value>)] {
        &self.changes
    }

    pub fn get(&self, field: &str) -> Option<&FieldChange<Value>> {
        self.changes
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, change)| change)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn track_set(&mut self, field: &str, old: Value, new: Value) {
        let had_change = !self.changes.is_empty();
        match self.changes.iter().position(|(name, _)| name == field) {
            Some(index) => self.changes[index].1.new = new,
            None => self
                .changes
                .push((field.to_string(), FieldChange { old, new })),
        }
        self.notifier.transition(had_change, true);
    }
}

/// Record a field assignment on an optional tracker
///
/// Generated setters call this with the value before and after the assignment.
/// Does nothing when no tracker is attached.
pub fn track_field<P, T: Serialize + ?Sized>(
    tracker: &mut Option<PocoTracker<P>>,
    field: &str,
    old: &T,
    new: &T,
) -> Result<(), TrackError> {
    if let Some(tracker) = tracker.as_mut() {
        tracker.track_set(field, to_value(old)?, to_value(new)?);
    }
    Ok(())
}

impl<P: Poco> Tracker for PocoTracker<P> {
    type Target = P;

    fn has_change(&self) -> bool {
        !self.changes.is_empty()
    }

    fn clear(&mut self) {
        self.changes.clear();
    }

    fn apply_to(&self, target: &mut P) -> Result<(), TrackError> {
        for (field, change) in &self.changes {
            target.set_field_value(field, change.new.clone())?;
        }
        Ok(())
    }

    fn apply_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError> {
        for (field, change) in &self.changes {
            tracker.track_set(field, change.old.clone(), change.new.clone());
        }
        Ok(())
    }

    fn rollback_to(&self, target: &mut P) -> Result<(), TrackError> {
        for (field, change) in &self.changes {
            target.set_field_value(field, change.old.clone())?;
        }
        Ok(())
    }

    fn rollback_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError> {
        for (field, change) in &self.changes {
            tracker.track_set(field, change.new.clone(), change.old.clone());
        }
        Ok(())
    }

    fn to_change_set(&self) -> Result<ChangeSet, TrackError> {
        Ok(ChangeSet::Poco(self.changes.clone()))
    }

    fn from_change_set(change_set: &ChangeSet) -> Result<Self, TrackError> {
        let ChangeSet::Poco(changes) = change_set else {
            return Err(change_set.mismatch(Shape::Poco));
        };
        let schema = P::schema();
        if let Some((unknown, _)) = changes.iter().find(|(name, _)| schema.get(name).is_none()) {
            return Err(TrackError::UnknownField(unknown.clone()));
        }
        Ok(Self {
            changes: changes.clone(),
            ..Self::default()
        })
    }

    fn notifier_mut(&mut self) -> &mut ChangeNotifier {
        &mut self.notifier
    }
}
