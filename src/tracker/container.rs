//! Container change snapshots.

use super::ChangeSource;
use crate::change::ChangeSet;
use crate::error::TrackError;
use crate::registry::Shape;
use crate::trackable::Container;
use std::fmt;
use std::marker::PhantomData;

/// Captured changes of a [`Container`]'s fields
///
/// A container's fields own their trackers, so the container itself records
/// nothing. This snapshot holds the changeset of every changed field at the time
/// of capture; its own changeset is always empty.
pub struct ContainerTracker<C> {
    fields: Vec<(String, ChangeSet)>,
    _target: PhantomData<fn() -> C>,
}

impl<C> Default for ContainerTracker<C> {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            _target: PhantomData,
        }
    }
}

impl<C> fmt::Debug for ContainerTracker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerTracker")
            .field("fields", &self.fields)
            .finish()
    }
}

impl<C: Container> ContainerTracker<C> {
    /// Snapshot the changesets of the container's changed fields
    pub fn capture(container: &C) -> Result<Self, TrackError> {
        let mut fields = Vec::new();
        for (name, field) in container.fields() {
            if let Some(change_set) = field.change_set()? {
                if !change_set.is_empty() {
                    fields.push((name.to_string(), change_set));
                }
            }
        }
        Ok(Self {
            fields,
            _target: PhantomData,
        })
    }

    pub fn fields(&self) -> &[(String, ChangeSet)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&ChangeSet> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, change_set)| change_set)
    }

    /// OR of the captured field changesets
    pub fn has_change(&self) -> bool {
        self.fields.iter().any(|(_, change_set)| !change_set.is_empty())
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// Replay each captured field changeset onto the matching field of `target`
    pub fn apply_to(&self, target: &mut C) -> Result<(), TrackError> {
        for (name, change_set) in &self.fields {
            target
                .field_mut(name)
                .ok_or_else(|| TrackError::UnknownField(name.clone()))?
                .apply_change_set(change_set)?;
        }
        Ok(())
    }

    /// Invert each captured field changeset onto the matching field of `target`
    pub fn rollback_to(&self, target: &mut C) -> Result<(), TrackError> {
        for (name, change_set) in self.fields.iter().rev() {
            target
                .field_mut(name)
                .ok_or_else(|| TrackError::UnknownField(name.clone()))?
                .rollback_change_set(change_set)?;
        }
        Ok(())
    }

    pub fn to_change_set(&self) -> ChangeSet {
        ChangeSet::Container(self.fields.clone())
    }

    pub fn from_change_set(change_set: &ChangeSet) -> Result<Self, TrackError> {
        let ChangeSet::Container(fields) = change_set else {
            return Err(change_set.mismatch(Shape::Container));
        };
        let schema = C::schema();
        if let Some((unknown, _)) = fields.iter().find(|(name, _)| schema.get(name).is_none()) {
            return Err(TrackError::UnknownField(unknown.clone()));
        }
        Ok(Self {
            fields: fields.clone(),
            _target: PhantomData,
        })
    }
}

impl<C: Container> ChangeSource for ContainerTracker<C> {
    fn has_change(&self) -> bool {
        ContainerTracker::has_change(self)
    }

    fn change_set(&self) -> Result<ChangeSet, TrackError> {
        Ok(self.to_change_set())
    }
}
