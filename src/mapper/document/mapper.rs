use super::{DocumentSession, UpdateOp};
use crate::change::{
    from_value, key_string, to_value, ChangeSet, DictionaryOperation, ListOperation, SetOperation,
};
use crate::config::DocumentSettings;
use crate::error::MapperError;
use crate::mapper::{check_arity, display_keys, Key, Mapper};
use crate::trackable::Trackable;
use crate::tracker::ChangeSource;
use crate::tree::{changed_trackables_with_path, segments};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::{debug, trace, warn};

/// Document mapper for any shape
///
/// The first key component is the document id; remaining components form the
/// path of the addressed value inside the document.
#[derive(Debug)]
pub struct DocumentMapper<T> {
    settings: DocumentSettings,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for DocumentMapper<T> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> Default for DocumentMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

const BACKEND: &str = "document";

fn join(separator: &str, parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}{}{}", parent, separator, segment)
    }
}

/// Dotted field paths cannot express a segment holding the separator
fn check_segment<'s>(separator: &str, segment: &'s str) -> Result<&'s str, MapperError> {
    if !separator.is_empty() && segment.contains(separator) {
        return Err(MapperError::UnsupportedOperation {
            backend: BACKEND,
            operation: format!("segment '{}' holding the separator '{}'", segment, separator),
        });
    }
    Ok(segment)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Front,
    Back,
}

/// Pending run of pushes at one list end
struct PushRun {
    end: End,
    values: Vec<Value>,
}

impl PushRun {
    fn flush(self, path: &str, ops: &mut Vec<UpdateOp>) {
        match self.end {
            End::Back => ops.push(UpdateOp::Push {
                path: path.to_string(),
                values: self.values,
                position: None,
            }),
            End::Front => ops.push(UpdateOp::Push {
                path: path.to_string(),
                values: self.values.into_iter().rev().collect(),
                position: Some(0),
            }),
        }
    }
}

fn set_or_unset(path: String, value: Option<&Value>) -> UpdateOp {
    match value {
        Some(value) if !value.is_null() => UpdateOp::Set {
            path,
            value: value.clone(),
        },
        _ => UpdateOp::Unset { path },
    }
}

/// Update ops applying `change_set` to the value at `path`
///
/// Contiguous runs of PushBack (or PushFront) entries are coalesced into one
/// push; every other list entry is emitted on its own.
///
/// # Errors
///
/// `UnsupportedOperation` when a dictionary key contains the separator.
pub fn render_ops(
    change_set: &ChangeSet,
    path: &str,
    separator: &str,
) -> Result<Vec<UpdateOp>, MapperError> {
    let mut ops = Vec::new();
    render_into(change_set, path, separator, &mut ops)?;
    Ok(ops)
}

fn render_into(
    change_set: &ChangeSet,
    path: &str,
    separator: &str,
    ops: &mut Vec<UpdateOp>,
) -> Result<(), MapperError> {
    match change_set {
        ChangeSet::Poco(fields) => {
            for (field, change) in fields {
                ops.push(set_or_unset(join(separator, path, field), Some(&change.new)));
            }
        }
        ChangeSet::Dictionary(entries) => {
            for (key, change) in entries {
                let key = key_string(key);
                let entry = join(separator, path, check_segment(separator, &key)?);
                match change.op {
                    DictionaryOperation::Add | DictionaryOperation::Modify => {
                        ops.push(set_or_unset(entry, change.new.as_ref()))
                    }
                    DictionaryOperation::Remove => ops.push(UpdateOp::Unset { path: entry }),
                }
            }
        }
        ChangeSet::Set(members) => {
            let pick = |wanted: SetOperation| -> Vec<Value> {
                members
                    .iter()
                    .filter(|(_, op)| *op == wanted)
                    .map(|(member, _)| member.clone())
                    .collect()
            };
            let added = pick(SetOperation::Add);
            let removed = pick(SetOperation::Remove);
            if !added.is_empty() {
                ops.push(UpdateOp::AddToSet {
                    path: path.to_string(),
                    values: added,
                });
            }
            if !removed.is_empty() {
                ops.push(UpdateOp::Pull {
                    path: path.to_string(),
                    values: removed,
                });
            }
        }
        ChangeSet::List(log) => {
            let mut run: Option<PushRun> = None;
            for change in log {
                let end = match change.op {
                    ListOperation::PushBack => Some(End::Back),
                    ListOperation::PushFront => Some(End::Front),
                    _ => None,
                };
                if let Some(end) = end {
                    let value = change.new.clone().unwrap_or(Value::Null);
                    if let Some(pending) = run.as_mut().filter(|pending| pending.end == end) {
                        pending.values.push(value);
                        continue;
                    }
                    if let Some(pending) = run.take() {
                        pending.flush(path, ops);
                    }
                    run = Some(PushRun {
                        end,
                        values: vec![value],
                    });
                    continue;
                }
                if let Some(pending) = run.take() {
                    pending.flush(path, ops);
                }
                let op = match change.op {
                    ListOperation::Insert => UpdateOp::Push {
                        path: path.to_string(),
                        values: vec![change.new.clone().unwrap_or(Value::Null)],
                        position: Some(change.index),
                    },
                    ListOperation::Remove => UpdateOp::RemoveAt {
                        path: path.to_string(),
                        index: change.index,
                    },
                    ListOperation::Modify => UpdateOp::Set {
                        path: join(separator, path, &change.index.to_string()),
                        value: change.new.clone().unwrap_or(Value::Null),
                    },
                    ListOperation::PopFront => UpdateOp::PopFirst {
                        path: path.to_string(),
                    },
                    _ => UpdateOp::PopLast {
                        path: path.to_string(),
                    },
                };
                ops.push(op);
            }
            if let Some(pending) = run {
                pending.flush(path, ops);
            }
        }
        ChangeSet::Container(fields) => {
            for (field, nested) in fields {
                render_into(nested, &join(separator, path, field), separator, ops)?;
            }
        }
    }
    Ok(())
}

impl<T> DocumentMapper<T> {
    pub fn new() -> Self {
        Self::with_settings(DocumentSettings::default())
    }

    pub fn with_settings(settings: DocumentSettings) -> Self {
        Self {
            settings,
            _value: PhantomData,
        }
    }

    pub fn settings(&self) -> &DocumentSettings {
        &self.settings
    }

    /// Document id and nested path of a key path
    fn address<'k>(&self, keys: &'k [Key]) -> Result<(&'k Key, String), MapperError> {
        check_arity(keys, 1)?;
        let separator = &self.settings.path_separator;
        let mut path = String::new();
        for key in &keys[1..] {
            let segment = key.to_string();
            path = join(separator, &path, check_segment(separator, &segment)?);
        }
        Ok((&keys[0], path))
    }

    /// Raw value at the addressed path, with the id field stripped from a whole document
    async fn find(
        &self,
        session: &dyn DocumentSession,
        keys: &[Key],
    ) -> Result<Option<Value>, MapperError> {
        let (id, path) = self.address(keys)?;
        if path.is_empty() {
            let Some(mut document) = session.find(id, None).await? else {
                return Ok(None);
            };
            if let Value::Object(map) = &mut document {
                map.remove(&self.settings.id_field);
            }
            return Ok(Some(document));
        }
        Ok(session.find(id, Some(path.as_str())).await?)
    }

    /// Load any sub-value addressed by a key path
    pub async fn load_partial<U: DeserializeOwned>(
        &self,
        session: &dyn DocumentSession,
        keys: &[Key],
    ) -> Result<Option<U>, MapperError> {
        match self.find(session, keys).await? {
            Some(value) => Ok(Some(decode(value, keys)?)),
            None => Ok(None),
        }
    }

    /// Persist every changed node below `root` as one document update
    ///
    /// Changes below a parent without changes of its own are included. Trackers
    /// are left as they are.
    pub async fn save_tree(
        &self,
        session: &dyn DocumentSession,
        root: &dyn Trackable,
        keys: &[Key],
    ) -> Result<usize, MapperError> {
        let (id, base) = self.address(keys)?;
        let separator = &self.settings.path_separator;
        let mut ops = Vec::new();
        for (tree_path, node) in changed_trackables_with_path(root) {
            let Some(change_set) = node.change_set()? else {
                continue;
            };
            let mut path = base.clone();
            for segment in segments(&tree_path) {
                path = join(separator, &path, check_segment(separator, &segment)?);
            }
            trace!(path = %path, changes = change_set.len(), "Rendering node");
            render_into(&change_set, &path, separator, &mut ops)?;
        }
        self.submit(session, id, ops, keys).await
    }

    async fn submit(
        &self,
        session: &dyn DocumentSession,
        id: &Key,
        ops: Vec<UpdateOp>,
        keys: &[Key],
    ) -> Result<usize, MapperError> {
        if ops.is_empty() {
            return Ok(0);
        }
        debug!(keys = %display_keys(keys), ops = ops.len(), "Updating document");
        Ok(session.update(id, &ops, true).await?)
    }
}

fn decode<U: DeserializeOwned>(value: Value, keys: &[Key]) -> Result<U, MapperError> {
    from_value(value).map_err(|err| {
        warn!(
            keys = %display_keys(keys),
            error = %err,
            "Stored value does not match the requested type"
        );
        err.into()
    })
}

#[async_trait]
impl<T> Mapper for DocumentMapper<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    type Session = dyn DocumentSession;
    type Value = T;

    /// Overwrites any existing value at the address
    async fn create(
        &self,
        session: &Self::Session,
        value: &T,
        keys: &[Key],
    ) -> Result<usize, MapperError> {
        let (id, path) = self.address(keys)?;
        let mut value = to_value(value)?;
        if path.is_empty() {
            if let Value::Object(map) = &mut value {
                map.insert(self.settings.id_field.clone(), id.to_value());
            }
            debug!(keys = %display_keys(keys), "Replacing document");
            return Ok(session.replace(id, &value).await?);
        }
        self.submit(session, id, vec![UpdateOp::Set { path, value }], keys).await
    }

    async fn load(&self, session: &Self::Session, keys: &[Key]) -> Result<Option<T>, MapperError> {
        self.load_partial(session, keys).await
    }

    async fn save(
        &self,
        session: &Self::Session,
        changes: &dyn ChangeSource,
        keys: &[Key],
    ) -> Result<usize, MapperError> {
        let (id, path) = self.address(keys)?;
        if !changes.has_change() {
            return Ok(0);
        }
        let ops = render_ops(&changes.change_set()?, &path, &self.settings.path_separator)?;
        self.submit(session, id, ops, keys).await
    }

    async fn delete(&self, session: &Self::Session, keys: &[Key]) -> Result<usize, MapperError> {
        let (id, path) = self.address(keys)?;
        if path.is_empty() {
            return Ok(session.delete(id).await?);
        }
        debug!(keys = %display_keys(keys), "Unsetting path");
        Ok(session.update(id, &[UpdateOp::Unset { path }], false).await?)
    }
}
