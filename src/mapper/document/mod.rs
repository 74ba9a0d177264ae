//! Document Store Mapping
//!
//! One JSON document per aggregate root, nested objects and arrays per field.
//! Changes become field-level [`UpdateOp`]s at dotted paths; all ops of one call
//! are applied to the document atomically by the [`DocumentSession`].

mod mapper;

pub use mapper::{render_ops, DocumentMapper};

use crate::config::DocumentSettings;
use crate::error::{BackendError, BackendErrorKind};
use crate::mapper::Key;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Field-level update of one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum UpdateOp {
    Set { path: String, value: Value },
    Unset { path: String },
    /// Insert `values` in order at `position`, or append when `None`
    Push {
        path: String,
        values: Vec<Value>,
        position: Option<usize>,
    },
    PopFirst { path: String },
    PopLast { path: String },
    RemoveAt { path: String, index: usize },
    /// Append each value not already present
    AddToSet { path: String, values: Vec<Value> },
    /// Remove every element equal to one of `values`
    Pull { path: String, values: Vec<Value> },
}

impl UpdateOp {
    pub fn path(&self) -> &str {
        match self {
            UpdateOp::Set { path, .. }
            | UpdateOp::Unset { path }
            | UpdateOp::Push { path, .. }
            | UpdateOp::PopFirst { path }
            | UpdateOp::PopLast { path }
            | UpdateOp::RemoveAt { path, .. }
            | UpdateOp::AddToSet { path, .. }
            | UpdateOp::Pull { path, .. } => path,
        }
    }
}

/// Caller-owned document store connection
#[async_trait]
pub trait DocumentSession: Send + Sync {
    /// The document, or only the sub-value at `projection`
    async fn find(&self, id: &Key, projection: Option<&str>) -> Result<Option<Value>, BackendError>;

    /// Apply `ops` in order as one atomic update; returns 1 when a document was written
    async fn update(&self, id: &Key, ops: &[UpdateOp], upsert: bool) -> Result<usize, BackendError>;

    async fn replace(&self, id: &Key, document: &Value) -> Result<usize, BackendError>;

    async fn delete(&self, id: &Key) -> Result<usize, BackendError>;
}

const TREE_DOCUMENTS: &str = "documents";

/// [`DocumentSession`] keeping JSON documents in a sled tree
pub struct SledDocumentStore {
    db: sled::Db,
    documents: sled::Tree,
    separator: String,
    writer: Mutex<()>,
}

impl std::fmt::Debug for SledDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledDocumentStore")
            .field("separator", &self.separator)
            .finish_non_exhaustive()
    }
}

fn to_backend_io(err: sled::Error) -> BackendError {
    BackendError::io(err.to_string())
}

fn to_backend_data(err: serde_json::Error) -> BackendError {
    BackendError::decode(err.to_string())
}

fn wrong_type(path: &str, message: &str) -> BackendError {
    BackendError::new(BackendErrorKind::WrongType, format!("{} at '{}'", message, path))
}

impl SledDocumentStore {
    pub fn new(db: sled::Db) -> Result<Self, BackendError> {
        let documents = db.open_tree(TREE_DOCUMENTS).map_err(to_backend_io)?;
        Ok(Self {
            db,
            documents,
            separator: DocumentSettings::default().path_separator,
            writer: Mutex::new(()),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        Self::new(sled::open(path).map_err(to_backend_io)?)
    }

    /// Store removed when dropped
    pub fn temporary() -> Result<Self, BackendError> {
        Self::new(
            sled::Config::new()
                .temporary(true)
                .open()
                .map_err(to_backend_io)?,
        )
    }

    pub fn with_path_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Split update paths the way a mapper built from `settings` joins them
    pub fn with_settings(self, settings: &DocumentSettings) -> Self {
        self.with_path_separator(settings.path_separator.clone())
    }

    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn key(id: &Key) -> Result<Vec<u8>, BackendError> {
        serde_json::to_vec(id).map_err(to_backend_data)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Value>, BackendError> {
        let Some(raw) = self.documents.get(key).map_err(to_backend_io)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw).map_err(to_backend_data)?))
    }

    fn put(&self, key: &[u8], document: &Value) -> Result<(), BackendError> {
        let raw = serde_json::to_vec(document).map_err(to_backend_data)?;
        self.documents.insert(key, raw).map_err(to_backend_io)?;
        self.documents.flush().map_err(to_backend_io)?;
        Ok(())
    }

    fn segments<'a>(&self, path: &'a str) -> Vec<&'a str> {
        if self.separator.is_empty() || path.is_empty() {
            return if path.is_empty() { Vec::new() } else { vec![path] };
        }
        path.split(self.separator.as_str())
            .filter(|segment| !segment.is_empty())
            .collect()
    }
}

#[async_trait]
impl DocumentSession for SledDocumentStore {
    async fn find(
        &self,
        id: &Key,
        projection: Option<&str>,
    ) -> Result<Option<Value>, BackendError> {
        let Some(document) = self.get(&Self::key(id)?)? else {
            return Ok(None);
        };
        match projection {
            None => Ok(Some(document)),
            Some(path) => Ok(get_path(&document, &self.segments(path)).cloned()),
        }
    }

    async fn update(
        &self,
        id: &Key,
        ops: &[UpdateOp],
        upsert: bool,
    ) -> Result<usize, BackendError> {
        let key = Self::key(id)?;
        let _guard = self.writer.lock();
        let mut document = match self.get(&key)? {
            Some(document) => document,
            None if upsert => Value::Object(Map::new()),
            None => return Ok(0),
        };
        for (index, op) in ops.iter().enumerate() {
            apply_op(&mut document, op, &self.segments(op.path())).map_err(|err| err.at(index))?;
        }
        self.put(&key, &document)?;
        Ok(1)
    }

    async fn replace(&self, id: &Key, document: &Value) -> Result<usize, BackendError> {
        let key = Self::key(id)?;
        let _guard = self.writer.lock();
        self.put(&key, document)?;
        Ok(1)
    }

    async fn delete(&self, id: &Key) -> Result<usize, BackendError> {
        let key = Self::key(id)?;
        let _guard = self.writer.lock();
        let removed = self.documents.remove(key).map_err(to_backend_io)?;
        Ok(usize::from(removed.is_some()))
    }
}

/// Sub-value at `path`; array segments are indices
pub fn get_path<'a>(document: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut node = document;
    for segment in path {
        node = match node {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

fn get_existing_mut<'a>(document: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    let mut node = document;
    for segment in path {
        node = match node {
            Value::Object(map) => map.get_mut(*segment)?,
            Value::Array(items) => items.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Mutable sub-value at `path`, creating missing objects along the way
fn get_path_mut<'a>(
    document: &'a mut Value,
    path: &[&str],
    joined: &str,
) -> Result<&'a mut Value, BackendError> {
    let mut node = document;
    for segment in path {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
            Value::Array(items) => {
                let index = segment
                    .parse::<usize>()
                    .map_err(|_| wrong_type(joined, "non-numeric array index"))?;
                let len = items.len();
                items
                    .get_mut(index)
                    .ok_or_else(|| {
                        wrong_type(joined, &format!("index {} beyond length {}", index, len))
                    })?
            }
            _ => return Err(wrong_type(joined, "path crosses a scalar")),
        };
    }
    Ok(node)
}

fn array_at<'a>(
    document: &'a mut Value,
    path: &[&str],
    joined: &str,
) -> Result<&'a mut Vec<Value>, BackendError> {
    let node = get_path_mut(document, path, joined)?;
    if node.is_null() {
        *node = Value::Array(Vec::new());
    }
    match node {
        Value::Array(items) => Ok(items),
        _ => Err(wrong_type(joined, "not an array")),
    }
}

/// Apply one op to a document
pub fn apply_op(document: &mut Value, op: &UpdateOp, path: &[&str]) -> Result<(), BackendError> {
    let joined = op.path();
    match op {
        UpdateOp::Set { value, .. } => {
            *get_path_mut(document, path, joined)? = value.clone();
        }
        UpdateOp::Unset { .. } => {
            let Some((last, parent)) = path.split_last() else {
                *document = Value::Null;
                return Ok(());
            };
            match get_existing_mut(document, parent) {
                Some(Value::Object(map)) => {
                    map.remove(*last);
                }
                Some(Value::Array(items)) => {
                    if let Some(item) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                        *item = Value::Null;
                    }
                }
                _ => {}
            }
        }
        UpdateOp::Push { values, position, .. } => {
            let items = array_at(document, path, joined)?;
            match position {
                None => items.extend(values.iter().cloned()),
                Some(position) => {
                    let at = (*position).min(items.len());
                    for (offset, value) in values.iter().enumerate() {
                        items.insert(at + offset, value.clone());
                    }
                }
            }
        }
        UpdateOp::PopFirst { .. } => {
            let items = array_at(document, path, joined)?;
            if !items.is_empty() {
                items.remove(0);
            }
        }
        UpdateOp::PopLast { .. } => {
            array_at(document, path, joined)?.pop();
        }
        UpdateOp::RemoveAt { index, .. } => {
            let items = array_at(document, path, joined)?;
            if *index >= items.len() {
                return Err(wrong_type(
                    joined,
                    &format!("index {} beyond length {}", index, items.len()),
                ));
            }
            items.remove(*index);
        }
        UpdateOp::AddToSet { values, .. } => {
            let items = array_at(document, path, joined)?;
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
        }
        UpdateOp::Pull { values, .. } => {
            array_at(document, path, joined)?.retain(|item| !values.contains(item));
        }
    }
    Ok(())
}
