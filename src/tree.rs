//! Composition Tree
//!
//! Addressing over nested trackables. A path is a sequence of segments joined by
//! `.`: a field name for Poco and Container values, the stringified key for
//! dictionaries, the index for lists. The empty path is the root. Sets have no
//! addressable children.
//!
//! A segment holding `.` or `\` is written with that character preceded by
//! `\`, so a dictionary key such as `"v1.2"` stays one segment.

use crate::error::TrackError;
use crate::trackable::Trackable;
use std::borrow::Cow;

/// Separator between path segments
pub const PATH_SEPARATOR: char = '.';

const ESCAPE: char = '\\';

/// Split a path into its unescaped segments; the empty path has none
pub fn segments(path: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            PATH_SEPARATOR => {
                if !current.is_empty() {
                    found.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        found.push(current);
    }
    found
}

/// Escape one segment for use in a path
pub fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains([PATH_SEPARATOR, ESCAPE]) {
        return Cow::Borrowed(segment);
    }
    let mut escaped = String::with_capacity(segment.len() + 2);
    for c in segment.chars() {
        if c == PATH_SEPARATOR || c == ESCAPE {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

/// Append one segment to a path, escaping it
pub fn join_path(parent: &str, segment: &str) -> String {
    let segment = escape_segment(segment);
    if parent.is_empty() {
        segment.into_owned()
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, segment)
    }
}

/// Resolve a path below `root`
pub fn get_trackable_by_path<'a>(
    root: &'a dyn Trackable,
    path: &str,
) -> Option<&'a dyn Trackable> {
    let mut node = root;
    for segment in segments(path) {
        node = node.child_trackable(&segment)?;
    }
    Some(node)
}

pub fn get_trackable_by_path_mut<'a>(
    root: &'a mut dyn Trackable,
    path: &str,
) -> Option<&'a mut dyn Trackable> {
    let mut node = root;
    for segment in segments(path) {
        node = node.child_trackable_mut(&segment)?;
    }
    Some(node)
}

/// Like [`get_trackable_by_path`], failing with `UnknownPath`
pub fn require_path<'a>(
    root: &'a dyn Trackable,
    path: &str,
) -> Result<&'a dyn Trackable, TrackError> {
    get_trackable_by_path(root, path).ok_or_else(|| TrackError::UnknownPath(path.to_string()))
}

pub fn require_path_mut<'a>(
    root: &'a mut dyn Trackable,
    path: &str,
) -> Result<&'a mut dyn Trackable, TrackError> {
    get_trackable_by_path_mut(root, path).ok_or_else(|| TrackError::UnknownPath(path.to_string()))
}

/// Every node holding its own changes, with its path, in depth-first order
///
/// Every trackable node is visited, including those below a parent without
/// changes of its own. Plain element values are never visited.
pub fn changed_trackables_with_path(root: &dyn Trackable) -> Vec<(String, &dyn Trackable)> {
    let mut found = Vec::new();
    walk(root, String::new(), &mut found);
    found
}

fn walk<'a>(node: &'a dyn Trackable, path: String, found: &mut Vec<(String, &'a dyn Trackable)>) {
    if node.has_own_change() {
        found.push((path.clone(), node));
    }
    for (name, child) in node.child_trackables(false) {
        walk(child, join_path(&path, &name), found);
    }
}
