//! Change Transport
//!
//! Captures the pending changes of a whole tree as a map from composed path to
//! [`ChangeSet`], serializes it as JSON, and replays it onto another tree of the
//! same layout.

use crate::change::ChangeSet;
use crate::error::TrackError;
use crate::trackable::Trackable;
use crate::tree::{changed_trackables_with_path, require_path_mut};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Pending changes of a tree keyed by path
///
/// Ordered by path, so a parent always precedes its descendants.
pub type ChangeMap = BTreeMap<String, ChangeSet>;

/// Own changesets of every changed node, paired with its path
pub fn changed_trackers_with_path(
    root: &dyn Trackable,
) -> Result<Vec<(String, ChangeSet)>, TrackError> {
    let mut found = Vec::new();
    for (path, node) in changed_trackables_with_path(root) {
        if let Some(change_set) = node.change_set()? {
            found.push((path, change_set));
        }
    }
    Ok(found)
}

/// Collect the changes of `root` into a [`ChangeMap`]
pub fn collect_changes(root: &dyn Trackable) -> Result<ChangeMap, TrackError> {
    Ok(changed_trackers_with_path(root)?.into_iter().collect())
}

/// Serialize the changes of `root` as a JSON object `{path: changeset}`
pub fn encode_changes(root: &dyn Trackable) -> Result<String, TrackError> {
    let changes = collect_changes(root)?;
    debug!(paths = changes.len(), "Encoding tree changes");
    Ok(serde_json::to_string(&changes)?)
}

pub fn decode_changes(text: &str) -> Result<ChangeMap, TrackError> {
    Ok(serde_json::from_str(text)?)
}

/// Replay decoded changes onto `root`
///
/// Every path must resolve in `root` at the time it is applied. Stops at the
/// first failure; paths applied before it stay applied.
pub fn apply_changes(root: &mut dyn Trackable, changes: &ChangeMap) -> Result<(), TrackError> {
    for (path, change_set) in changes {
        trace!(path = %path, shape = ?change_set.shape(), "Applying changeset");
        require_path_mut(root, path)?.apply_change_set(change_set)?;
    }
    Ok(())
}

/// Decode `text` and replay it onto `root`
pub fn apply_encoded(root: &mut dyn Trackable, text: &str) -> Result<(), TrackError> {
    apply_changes(root, &decode_changes(text)?)
}
