//! Containers: fixed named fields that are themselves trackables.

use super::{Element, Trackable};
use crate::registry::Schema;

/// Generator contract for a type whose every field is a trackable
///
/// The container records nothing itself. Attaching, clearing and rolling back
/// are delegated to the fields, and its changes are read with
/// [`ContainerTracker::capture`](crate::tracker::ContainerTracker::capture).
pub trait Container: Element {
    fn schema() -> Schema;

    fn fields(&self) -> Vec<(&'static str, &dyn Trackable)>;

    fn fields_mut(&mut self) -> Vec<(&'static str, &mut dyn Trackable)>;

    fn field(&self, name: &str) -> Option<&dyn Trackable> {
        self.fields()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut dyn Trackable> {
        self.fields_mut()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }
}

#[doc(hidden)]
pub mod support {
    use super::Container;
    use crate::change::ChangeSet;
    use crate::error::TrackError;
    use crate::trackable::Trackable;
    use crate::tracker::ContainerTracker;

    pub fn is_tracked<C: Container>(container: &C) -> bool {
        container.fields().iter().any(|(_, field)| field.is_tracked())
    }

    pub fn changed<C: Container>(container: &C) -> bool {
        container.fields().iter().any(|(_, field)| field.changed())
    }

    pub fn set_default_tracker<C: Container>(container: &mut C) {
        for (_, field) in container.fields_mut() {
            field.set_default_tracker();
        }
    }

    pub fn detach_tracker<C: Container>(container: &mut C) {
        for (_, field) in container.fields_mut() {
            field.detach_tracker();
        }
    }

    pub fn clear_changes<C: Container>(container: &mut C) {
        for (_, field) in container.fields_mut() {
            field.clear_changes();
        }
    }

    pub fn rollback<C: Container>(container: &mut C) -> Result<(), TrackError> {
        for (_, field) in container.fields_mut() {
            field.rollback()?;
        }
        Ok(())
    }

    pub fn change_set<C: Container>(container: &C) -> Result<Option<ChangeSet>, TrackError> {
        if !is_tracked(container) {
            return Ok(None);
        }
        Ok(Some(ContainerTracker::capture(container)?.to_change_set()))
    }

    pub fn apply_change_set<C: Container>(
        container: &mut C,
        change_set: &ChangeSet,
    ) -> Result<(), TrackError> {
        ContainerTracker::<C>::from_change_set(change_set)?.apply_to(container)
    }

    pub fn rollback_change_set<C: Container>(
        container: &mut C,
        change_set: &ChangeSet,
    ) -> Result<(), TrackError> {
        ContainerTracker::<C>::from_change_set(change_set)?.rollback_to(container)
    }

    pub fn children<C: Container>(
        container: &C,
        changed_only: bool,
    ) -> Vec<(String, &dyn Trackable)> {
        container
            .fields()
            .into_iter()
            .filter(|(_, field)| !changed_only || field.changed())
            .map(|(name, field)| (name.to_string(), field))
            .collect()
    }

    pub fn children_mut<C: Container>(container: &mut C) -> Vec<(String, &mut dyn Trackable)> {
        container
            .fields_mut()
            .into_iter()
            .map(|(name, field)| (name.to_string(), field))
            .collect()
    }
}

/// Implement [`Trackable`] and [`Element`] for a type implementing [`Container`]
#[macro_export]
macro_rules! impl_trackable_container {
    ($ty:ty) => {
        impl $crate::trackable::Element for $ty {
            fn as_trackable(&self) -> Option<&dyn $crate::trackable::Trackable> {
                Some(self)
            }

            fn as_trackable_mut(&mut self) -> Option<&mut dyn $crate::trackable::Trackable> {
                Some(self)
            }
        }

        impl $crate::trackable::Trackable for $ty {
            fn shape(&self) -> $crate::registry::Shape {
                $crate::registry::Shape::Container
            }

            fn is_tracked(&self) -> bool {
                $crate::trackable::container_support::is_tracked(self)
            }

            fn has_own_change(&self) -> bool {
                false
            }

            fn changed(&self) -> bool {
                $crate::trackable::container_support::changed(self)
            }

            fn set_default_tracker(&mut self) {
                $crate::trackable::container_support::set_default_tracker(self)
            }

            fn detach_tracker(&mut self) {
                $crate::trackable::container_support::detach_tracker(self)
            }

            fn clear_changes(&mut self) {
                $crate::trackable::container_support::clear_changes(self)
            }

            fn rollback(&mut self) -> Result<(), $crate::error::TrackError> {
                $crate::trackable::container_support::rollback(self)
            }

            fn change_set(
                &self,
            ) -> Result<Option<$crate::change::ChangeSet>, $crate::error::TrackError> {
                $crate::trackable::container_support::change_set(self)
            }

            fn apply_change_set(
                &mut self,
                change_set: &$crate::change::ChangeSet,
            ) -> Result<(), $crate::error::TrackError> {
                $crate::trackable::container_support::apply_change_set(self, change_set)
            }

            fn rollback_change_set(
                &mut self,
                change_set: &$crate::change::ChangeSet,
            ) -> Result<(), $crate::error::TrackError> {
                $crate::trackable::container_support::rollback_change_set(self, change_set)
            }

            fn child_trackable(&self, name: &str) -> Option<&dyn $crate::trackable::Trackable> {
                $crate::trackable::Container::field(self, name)
            }

            fn child_trackable_mut(
                &mut self,
                name: &str,
            ) -> Option<&mut dyn $crate::trackable::Trackable> {
                $crate::trackable::Container::field_mut(self, name)
            }

            fn child_trackables(
                &self,
                changed_only: bool,
            ) -> Vec<(String, &dyn $crate::trackable::Trackable)> {
                $crate::trackable::container_support::children(self, changed_only)
            }

            fn child_trackables_mut(
                &mut self,
            ) -> Vec<(String, &mut dyn $crate::trackable::Trackable)> {
                $crate::trackable::container_support::children_mut(self)
            }

            fn to_value(&self) -> Result<$crate::Value, $crate::error::TrackError> {
                $crate::change::to_value(self)
            }
        }
    };
}
