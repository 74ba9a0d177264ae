//! Change Records
//!
//! Per-shape change records held by trackers, and [`ChangeSet`], the dynamic
//! backend-neutral form every mapper consumes.

use crate::error::TrackError;
use crate::registry::Shape;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Change to one Poco field: the value before the first set and the latest value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange<V> {
    pub old: V,
    pub new: V,
}

/// Operation recorded for one dictionary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DictionaryOperation {
    Add,
    Remove,
    Modify,
}

impl DictionaryOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            DictionaryOperation::Add => "add",
            DictionaryOperation::Remove => "remove",
            DictionaryOperation::Modify => "modify",
        }
    }
}

/// Merged state of one dictionary entry
///
/// `Add` carries only `new`, `Remove` only `old`, `Modify` both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryChange<V> {
    pub op: DictionaryOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<V>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<V>,
}

impl<V> DictionaryChange<V> {
    pub fn add(new: V) -> Self {
        Self {
            op: DictionaryOperation::Add,
            old: None,
            new: Some(new),
        }
    }

    pub fn remove(old: V) -> Self {
        Self {
            op: DictionaryOperation::Remove,
            old: Some(old),
            new: None,
        }
    }

    pub fn modify(old: V, new: V) -> Self {
        Self {
            op: DictionaryOperation::Modify,
            old: Some(old),
            new: Some(new),
        }
    }

    pub fn map<U>(
        self,
        mut f: impl FnMut(V) -> Result<U, TrackError>,
    ) -> Result<DictionaryChange<U>, TrackError> {
        Ok(DictionaryChange {
            op: self.op,
            old: self.old.map(&mut f).transpose()?,
            new: self.new.map(&mut f).transpose()?,
        })
    }
}

/// Operation recorded for one set member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOperation {
    Add,
    Remove,
}

impl SetOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            SetOperation::Add => "add",
            SetOperation::Remove => "remove",
        }
    }
}

/// Operation of one ordered list log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOperation {
    Insert,
    Remove,
    Modify,
    PushFront,
    PushBack,
    PopFront,
    PopBack,
}

impl ListOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ListOperation::Insert => "insert",
            ListOperation::Remove => "remove",
            ListOperation::Modify => "modify",
            ListOperation::PushFront => "push_front",
            ListOperation::PushBack => "push_back",
            ListOperation::PopFront => "pop_front",
            ListOperation::PopBack => "pop_back",
        }
    }
}

/// One entry of a list change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListChange<T> {
    pub op: ListOperation,
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<T>,
}

impl<T> ListChange<T> {
    pub fn new(op: ListOperation, index: usize, old: Option<T>, new: Option<T>) -> Self {
        Self { op, index, old, new }
    }

    pub fn map<U>(
        self,
        mut f: impl FnMut(T) -> Result<U, TrackError>,
    ) -> Result<ListChange<U>, TrackError> {
        Ok(ListChange {
            op: self.op,
            index: self.index,
            old: self.old.map(&mut f).transpose()?,
            new: self.new.map(&mut f).transpose()?,
        })
    }
}

/// Backend-neutral changeset of one trackable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "changes", rename_all = "snake_case")]
pub enum ChangeSet {
    Poco(Vec<(String, FieldChange<Value>)>),
    Dictionary(Vec<(Value, DictionaryChange<Value>)>),
    Set(Vec<(Value, SetOperation)>),
    /// Ordered log; never reordered or collapsed
    List(Vec<ListChange<Value>>),
    /// Changesets of the changed fields of a container
    Container(Vec<(String, ChangeSet)>),
}

impl ChangeSet {
    pub fn shape(&self) -> Shape {
        match self {
            ChangeSet::Poco(_) => Shape::Poco,
            ChangeSet::Dictionary(_) => Shape::Dictionary,
            ChangeSet::Set(_) => Shape::Set,
            ChangeSet::List(_) => Shape::List,
            ChangeSet::Container(_) => Shape::Container,
        }
    }

    /// Empty ChangeSet of the given trackable shape
    pub fn empty(shape: Shape) -> Result<Self, TrackError> {
        match shape {
            Shape::Poco => Ok(ChangeSet::Poco(Vec::new())),
            Shape::Dictionary => Ok(ChangeSet::Dictionary(Vec::new())),
            Shape::Set => Ok(ChangeSet::Set(Vec::new())),
            Shape::List => Ok(ChangeSet::List(Vec::new())),
            Shape::Container => Ok(ChangeSet::Container(Vec::new())),
            Shape::Value => Err(TrackError::ShapeMismatch {
                expected: Shape::Poco,
                actual: Shape::Value,
            }),
        }
    }

    /// True when no change is recorded, recursively for containers
    pub fn is_empty(&self) -> bool {
        match self {
            ChangeSet::Poco(changes) => changes.is_empty(),
            ChangeSet::Dictionary(changes) => changes.is_empty(),
            ChangeSet::Set(changes) => changes.is_empty(),
            ChangeSet::List(changes) => changes.is_empty(),
            ChangeSet::Container(fields) => fields.iter().all(|(_, cs)| cs.is_empty()),
        }
    }

    /// Number of change records, summed over container fields
    pub fn len(&self) -> usize {
        match self {
            ChangeSet::Poco(changes) => changes.len(),
            ChangeSet::Dictionary(changes) => changes.len(),
            ChangeSet::Set(changes) => changes.len(),
            ChangeSet::List(changes) => changes.len(),
            ChangeSet::Container(fields) => fields.iter().map(|(_, cs)| cs.len()).sum(),
        }
    }

    pub(crate) fn mismatch(&self, expected: Shape) -> TrackError {
        TrackError::ShapeMismatch {
            expected,
            actual: self.shape(),
        }
    }
}

/// Serialize a typed value into its dynamic form
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, TrackError> {
    Ok(serde_json::to_value(value)?)
}

/// Deserialize a typed value from its dynamic form
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, TrackError> {
    Ok(serde_json::from_value(value)?)
}

/// Stringified form of a dynamic key, as used in key paths
pub fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
