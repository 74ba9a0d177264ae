//! Trackers
//!
//! A tracker accumulates the change records of exactly one trackable value. Each
//! shape has its own merge rules: Poco fields collapse to `{first old, latest new}`,
//! dictionary entries and set members follow a per-key transition table, and list
//! changes form an append-only ordered log.

pub mod container;
pub mod dictionary;
pub mod list;
pub mod poco;
pub mod set;

use crate::change::ChangeSet;
use crate::error::TrackError;
use std::fmt;
use std::sync::Arc;

pub use container::ContainerTracker;
pub use dictionary::DictionaryTracker;
pub use list::ListTracker;
pub use poco::PocoTracker;
pub use set::SetTracker;

/// Accumulator of change records bound to one trackable
pub trait Tracker: Default + fmt::Debug + Send + Sync + 'static {
    /// Trackable type this tracker records
    type Target;

    fn has_change(&self) -> bool;

    /// Drop every recorded change
    fn clear(&mut self);

    /// Replay the recorded changes onto another live value, in recorded order
    fn apply_to(&self, target: &mut Self::Target) -> Result<(), TrackError>;

    /// Merge the recorded changes into another tracker
    fn apply_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError>;

    /// Invert the recorded changes onto a value, restoring its prior state
    fn rollback_to(&self, target: &mut Self::Target) -> Result<(), TrackError>;

    /// Merge the inverse of the recorded changes into another tracker
    fn rollback_to_tracker(&self, tracker: &mut Self) -> Result<(), TrackError>;

    /// Dynamic form of the recorded changes
    fn to_change_set(&self) -> Result<ChangeSet, TrackError>;

    /// Typed tracker holding the changes of a dynamic changeset
    fn from_change_set(change_set: &ChangeSet) -> Result<Self, TrackError>;

    fn notifier_mut(&mut self) -> &mut ChangeNotifier;
}

/// Anything a mapper can read a changeset from
pub trait ChangeSource: Send + Sync {
    fn has_change(&self) -> bool;

    fn change_set(&self) -> Result<ChangeSet, TrackError>;
}

impl<T: Tracker> ChangeSource for T {
    fn has_change(&self) -> bool {
        Tracker::has_change(self)
    }

    fn change_set(&self) -> Result<ChangeSet, TrackError> {
        self.to_change_set()
    }
}

impl ChangeSource for ChangeSet {
    fn has_change(&self) -> bool {
        !self.is_empty()
    }

    fn change_set(&self) -> Result<ChangeSet, TrackError> {
        Ok(self.clone())
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks fired when a tracker goes from unchanged to changed
///
/// A clone carries no callbacks.
#[derive(Default)]
pub struct ChangeNotifier {
    callbacks: Vec<Callback>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for the next false to true transition
    pub fn on_first_change<F>(&mut self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Fire the callbacks if `had_change` was false and `has_change` is true
    pub fn transition(&self, had_change: bool, has_change: bool) {
        if !had_change && has_change {
            for callback in &self.callbacks {
                callback();
            }
        }
    }
}

impl Clone for ChangeNotifier {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Build an InvalidTransition error for a key
pub(crate) fn invalid_transition(
    key: impl fmt::Debug,
    prior: &'static str,
    attempted: &'static str,
) -> TrackError {
    TrackError::InvalidTransition {
        key: format!("{:?}", key),
        prior,
        attempted,
    }
}
