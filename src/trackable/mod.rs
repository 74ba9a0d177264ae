//! Trackable Values
//!
//! Mutable data holders whose mutations are recorded by an attached tracker. A
//! value starts untracked; mutations made before a tracker is attached are
//! invisible to persistence. Cloning a trackable never carries its tracker.
//!
//! Collections ([`TrackableDictionary`], [`TrackableList`], [`TrackableSet`]) are
//! provided here. Poco and Container types are supplied by a generator that
//! implements [`Poco`] or [`Container`] and invokes [`impl_trackable_poco!`] or
//! [`impl_trackable_container!`] for the remaining boilerplate.
//!
//! [`impl_trackable_poco!`]: crate::impl_trackable_poco
//! [`impl_trackable_container!`]: crate::impl_trackable_container

mod container;
mod dictionary;
mod list;
mod poco;
mod set;

pub use container::Container;
pub use dictionary::TrackableDictionary;
pub use list::TrackableList;
pub use poco::Poco;
pub use set::TrackableSet;

#[doc(hidden)]
pub use container::support as container_support;
#[doc(hidden)]
pub use poco::support as poco_support;

use crate::change::ChangeSet;
use crate::error::TrackError;
use crate::registry::Shape;
use crate::tracker::Tracker;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// A value whose mutations can be recorded by an attached tracker
///
/// Object safe; the composition tree works on `&dyn Trackable`.
pub trait Trackable: fmt::Debug + Send + Sync {
    fn shape(&self) -> Shape;

    /// True when a tracker is attached
    fn is_tracked(&self) -> bool;

    /// True when the own tracker holds changes; children are not consulted
    fn has_own_change(&self) -> bool;

    /// True when this value holds changes of its own
    ///
    /// Containers, which record nothing themselves, report whether any field
    /// reports `changed()`. Changes held by grandchildren are not visible here;
    /// the composition walk finds them.
    fn changed(&self) -> bool {
        self.has_own_change()
    }

    /// Attach a fresh empty tracker, replacing any attached one
    fn set_default_tracker(&mut self);

    fn detach_tracker(&mut self);

    /// Clear the own tracker, leaving it attached
    fn clear_changes(&mut self);

    /// Revert every change recorded by the own tracker, then clear it
    fn rollback(&mut self) -> Result<(), TrackError>;

    /// Own tracker's changeset, `None` when untracked
    fn change_set(&self) -> Result<Option<ChangeSet>, TrackError>;

    /// Replay a changeset onto this value through its normal mutation path
    fn apply_change_set(&mut self, change_set: &ChangeSet) -> Result<(), TrackError>;

    /// Replay the inverse of a changeset onto this value
    fn rollback_change_set(&mut self, change_set: &ChangeSet) -> Result<(), TrackError>;

    /// Resolve one level of the composition tree
    fn child_trackable(&self, name: &str) -> Option<&dyn Trackable>;

    fn child_trackable_mut(&mut self, name: &str) -> Option<&mut dyn Trackable>;

    /// Trackable children with their names, optionally only the changed ones
    fn child_trackables(&self, changed_only: bool) -> Vec<(String, &dyn Trackable)>;

    fn child_trackables_mut(&mut self) -> Vec<(String, &mut dyn Trackable)>;

    /// Dynamic form of the current data
    fn to_value(&self) -> Result<Value, TrackError>;
}

/// A trackable that owns its tracker directly
pub trait Tracked: Trackable + Sized {
    type Tracker: Tracker<Target = Self>;

    fn tracker(&self) -> Option<&Self::Tracker>;

    fn tracker_mut(&mut self) -> Option<&mut Self::Tracker>;

    /// Bind a new tracker (or none), returning the detached previous one
    fn replace_tracker(&mut self, tracker: Option<Self::Tracker>) -> Option<Self::Tracker>;

    /// Register a callback fired when the attached tracker first records a change
    ///
    /// Returns false when no tracker is attached.
    fn on_first_change<F>(&mut self, callback: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        match self.tracker_mut() {
            Some(tracker) => {
                tracker.notifier_mut().on_first_change(callback);
                true
            }
            None => false,
        }
    }
}

/// Bound for values stored in trackable collections
///
/// Plain values report `None` from `as_trackable`; trackable values return
/// themselves so collections can expose them as children.
pub trait Element:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn as_trackable(&self) -> Option<&dyn Trackable> {
        None
    }

    fn as_trackable_mut(&mut self) -> Option<&mut dyn Trackable> {
        None
    }
}

macro_rules! plain_element {
    ($($ty:ty),* $(,)?) => {
        $(impl Element for $ty {})*
    };
}

plain_element!(
    bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
    String, Value,
);

impl<T: Element> Element for Option<T> {}
impl<T: Element> Element for Vec<T> {}

/// Bound for dictionary keys; stringified with `Display`, parsed back with `FromStr`
pub trait MapKey: Element + Ord + fmt::Display + FromStr {}

impl<T: Element + Ord + fmt::Display + FromStr> MapKey for T {}

/// Attach a fresh default tracker to a tracked value
pub fn attach_default<T: Tracked>(value: &mut T) {
    value.replace_tracker(Some(T::Tracker::default()));
    trace!(shape = ?value.shape(), "Attached default tracker");
}

/// Clear the attached tracker of a tracked value
pub fn clear_tracked<T: Tracked>(value: &mut T) {
    if let Some(tracker) = value.tracker_mut() {
        tracker.clear();
    }
}

/// True when a tracker is attached and holds changes
pub fn tracked_has_change<T: Tracked>(value: &T) -> bool {
    value.tracker().map_or(false, |tracker| tracker.has_change())
}

/// Own changeset of a tracked value
pub fn tracked_change_set<T: Tracked>(value: &T) -> Result<Option<ChangeSet>, TrackError> {
    value.tracker().map(|tracker| tracker.to_change_set()).transpose()
}

/// Roll a tracked value back to its state at the last clear
///
/// The tracker is detached for the duration of the replay so the inverse changes
/// are not recorded, then reattached. It is cleared only when the replay succeeds.
pub fn rollback_tracked<T: Tracked>(value: &mut T) -> Result<(), TrackError> {
    let Some(mut tracker) = value.replace_tracker(None) else {
        return Ok(());
    };
    let result = tracker.rollback_to(value);
    if result.is_ok() {
        tracker.clear();
    }
    value.replace_tracker(Some(tracker));
    result
}

/// Replay a dynamic changeset onto a tracked value
pub fn apply_change_set_to<T: Tracked>(
    value: &mut T,
    change_set: &ChangeSet,
) -> Result<(), TrackError> {
    T::Tracker::from_change_set(change_set)?.apply_to(value)
}

/// Replay the inverse of a dynamic changeset onto a tracked value
pub fn rollback_change_set_to<T: Tracked>(
    value: &mut T,
    change_set: &ChangeSet,
) -> Result<(), TrackError> {
    T::Tracker::from_change_set(change_set)?.rollback_to(value)
}

/// Attach default trackers to a value and every trackable below it
pub fn set_default_tracker_deep(value: &mut dyn Trackable) {
    value.set_default_tracker();
    for (_, child) in value.child_trackables_mut() {
        set_default_tracker_deep(child);
    }
}

/// Clear the trackers of a value and every trackable below it
pub fn clear_deep(value: &mut dyn Trackable) {
    value.clear_changes();
    for (_, child) in value.child_trackables_mut() {
        clear_deep(child);
    }
}

/// Roll back a value and every trackable below it
///
/// Children are rolled back before their parent, since the parent's own rollback
/// may replace children with their original values. Elements a collection
/// removed or replaced come back as they stood at the last clear, and when the
/// parent is tracked they are given default trackers like their siblings.
pub fn rollback_deep(value: &mut dyn Trackable) -> Result<(), TrackError> {
    for (_, child) in value.child_trackables_mut() {
        rollback_deep(child)?;
    }
    value.rollback()?;
    if value.is_tracked() && value.shape() != Shape::Container {
        for (name, child) in value.child_trackables_mut() {
            if !child.is_tracked() {
                trace!(child = %name, "Reattaching restored child");
                set_default_tracker_deep(child);
            }
        }
    }
    Ok(())
}

/// Copy of a value with every change recorded in or below it undone
///
/// Collections record this copy when an element leaves them, so rolling the
/// collection back restores the element as it stood at its last clear.
pub(crate) fn pristine<V: Element>(value: &V) -> V {
    let mut copy = value.clone();
    if let (Some(source), Some(target)) = (value.as_trackable(), copy.as_trackable_mut()) {
        enforce(unwind_into(source, target));
    }
    copy
}

fn unwind_into(source: &dyn Trackable, target: &mut dyn Trackable) -> Result<(), TrackError> {
    for (name, child) in source.child_trackables(false) {
        if let Some(child_target) = target.child_trackable_mut(&name) {
            unwind_into(child, child_target)?;
        }
    }
    if source.has_own_change() {
        if let Some(change_set) = source.change_set()? {
            target.rollback_change_set(&change_set)?;
        }
    }
    Ok(())
}

/// Panic on tracker divergence inside a mutation method
pub(crate) fn enforce(result: Result<(), TrackError>) {
    if let Err(err) = result {
        panic!("tracker diverged from its value: {}", err);
    }
}
