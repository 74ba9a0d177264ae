//! Poco records: fixed named fields tracked individually.

use super::{Element, Trackable};
use crate::error::TrackError;
use crate::registry::Schema;
use crate::tracker::PocoTracker;
use serde_json::Value;

/// Generator contract for a record type with fixed named fields
///
/// Scalar fields are tracked by the record's [`PocoTracker`]; generated setters
/// record each assignment with [`track_field`](crate::tracker::poco::track_field).
/// Fields holding trackables track themselves and are exposed through
/// [`children`](Poco::children).
pub trait Poco: Element {
    fn schema() -> Schema;

    /// Current value of a scalar field
    fn field_value(&self, field: &str) -> Result<Value, TrackError>;

    /// Assign a scalar field through its setter, so an attached tracker records it
    fn set_field_value(&mut self, field: &str, value: Value) -> Result<(), TrackError>;

    fn tracker_slot(&self) -> &Option<PocoTracker<Self>>;

    fn tracker_slot_mut(&mut self) -> &mut Option<PocoTracker<Self>>;

    fn children(&self) -> Vec<(&'static str, &dyn Trackable)> {
        Vec::new()
    }

    fn children_mut(&mut self) -> Vec<(&'static str, &mut dyn Trackable)> {
        Vec::new()
    }
}

#[doc(hidden)]
pub mod support {
    use super::Poco;
    use crate::trackable::Trackable;

    pub fn child<'a, P: Poco>(poco: &'a P, name: &str) -> Option<&'a dyn Trackable> {
        poco.children()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, child)| child)
    }

    pub fn child_mut<'a, P: Poco>(poco: &'a mut P, name: &str) -> Option<&'a mut dyn Trackable> {
        poco.children_mut()
            .into_iter()
            .find(|(field, _)| *field == name)
            .map(|(_, child)| child)
    }

    pub fn children<P: Poco>(poco: &P, changed_only: bool) -> Vec<(String, &dyn Trackable)> {
        poco.children()
            .into_iter()
            .filter(|(_, child)| !changed_only || child.changed())
            .map(|(field, child)| (field.to_string(), child))
            .collect()
    }

    pub fn children_mut<P: Poco>(poco: &mut P) -> Vec<(String, &mut dyn Trackable)> {
        poco.children_mut()
            .into_iter()
            .map(|(field, child)| (field.to_string(), child))
            .collect()
    }
}

/// Implement [`Trackable`], [`Tracked`](crate::trackable::Tracked) and
/// [`Element`] for a type implementing [`Poco`]
#[macro_export]
macro_rules! impl_trackable_poco {
    ($ty:ty) => {
        impl $crate::trackable::Element for $ty {
            fn as_trackable(&self) -> Option<&dyn $crate::trackable::Trackable> {
                Some(self)
            }

            fn as_trackable_mut(&mut self) -> Option<&mut dyn $crate::trackable::Trackable> {
                Some(self)
            }
        }

        impl $crate::trackable::Tracked for $ty {
            type Tracker = $crate::tracker::PocoTracker<$ty>;

            fn tracker(&self) -> Option<&Self::Tracker> {
                $crate::trackable::Poco::tracker_slot(self).as_ref()
            }

            fn tracker_mut(&mut self) -> Option<&mut Self::Tracker> {
                $crate::trackable::Poco::tracker_slot_mut(self).as_mut()
            }

            fn replace_tracker(&mut self, tracker: Option<Self::Tracker>) -> Option<Self::Tracker> {
                ::std::mem::replace($crate::trackable::Poco::tracker_slot_mut(self), tracker)
            }
        }

        impl $crate::trackable::Trackable for $ty {
            fn shape(&self) -> $crate::registry::Shape {
                $crate::registry::Shape::Poco
            }

            fn is_tracked(&self) -> bool {
                $crate::trackable::Poco::tracker_slot(self).is_some()
            }

            fn has_own_change(&self) -> bool {
                $crate::trackable::tracked_has_change(self)
            }

            fn set_default_tracker(&mut self) {
                $crate::trackable::attach_default(self)
            }

            fn detach_tracker(&mut self) {
                $crate::trackable::Tracked::replace_tracker(self, None);
            }

            fn clear_changes(&mut self) {
                $crate::trackable::clear_tracked(self)
            }

            fn rollback(&mut self) -> Result<(), $crate::error::TrackError> {
                $crate::trackable::rollback_tracked(self)
            }

            fn change_set(
                &self,
            ) -> Result<Option<$crate::change::ChangeSet>, $crate::error::TrackError> {
                $crate::trackable::tracked_change_set(self)
            }

            fn apply_change_set(
                &mut self,
                change_set: &$crate::change::ChangeSet,
            ) -> Result<(), $crate::error::TrackError> {
                $crate::trackable::apply_change_set_to(self, change_set)
            }

            fn rollback_change_set(
                &mut self,
                change_set: &$crate::change::ChangeSet,
            ) -> Result<(), $crate::error::TrackError> {
                $crate::trackable::rollback_change_set_to(self, change_set)
            }

            fn child_trackable(&self, name: &str) -> Option<&dyn $crate::trackable::Trackable> {
                $crate::trackable::poco_support::child(self, name)
            }

            fn child_trackable_mut(
                &mut self,
                name: &str,
            ) -> Option<&mut dyn $crate::trackable::Trackable> {
                $crate::trackable::poco_support::child_mut(self, name)
            }

            fn child_trackables(
                &self,
                changed_only: bool,
            ) -> Vec<(String, &dyn $crate::trackable::Trackable)> {
                $crate::trackable::poco_support::children(self, changed_only)
            }

            fn child_trackables_mut(
                &mut self,
            ) -> Vec<(String, &mut dyn $crate::trackable::Trackable)> {
                $crate::trackable::poco_support::children_mut(self)
            }

            fn to_value(&self) -> Result<$crate::Value, $crate::error::TrackError> {
                $crate::change::to_value(self)
            }
        }
    };
}
