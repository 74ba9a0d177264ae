use super::{KvCommand, KvReply, KvSession, ListEnd};
use crate::change::{
    from_value, key_string, to_value, ChangeSet, DictionaryOperation, ListOperation, SetOperation,
};
use crate::config::KvSettings;
use crate::error::{BackendError, MapperError, TrackError};
use crate::mapper::{check_arity, display_keys, Key, Mapper};
use crate::registry::{Schema, Shape};
use crate::tracker::ChangeSource;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use tracing::{debug, trace};

const BACKEND: &str = "kv";

/// Storage layout of one key
#[derive(Debug, Clone, PartialEq, Eq)]
enum Layout {
    /// Hash of field to JSON text, for Poco and Dictionary values
    Hash,
    List,
    Set,
    /// One key per field: (declared name, stored name, layout)
    Container(Vec<(String, String, Layout)>),
}

impl Layout {
    fn for_shape(shape: Shape, schema: Option<&Schema>) -> Result<Self, MapperError> {
        match shape {
            Shape::Poco | Shape::Dictionary => Ok(Layout::Hash),
            Shape::List => Ok(Layout::List),
            Shape::Set => Ok(Layout::Set),
            Shape::Container => {
                let schema = schema.ok_or_else(|| {
                    MapperError::Schema("Container layout needs a schema".to_string())
                })?;
                let fields = schema
                    .persisted_fields()
                    .map(|field| {
                        if field.shape == Shape::Container {
                            return Err(unsupported(format!(
                                "nested container field {}",
                                field.name
                            )));
                        }
                        Ok((
                            field.name.clone(),
                            field.stored_name().to_string(),
                            Layout::for_shape(field.shape, None)?,
                        ))
                    })
                    .collect::<Result<Vec<_>, MapperError>>()?;
                Ok(Layout::Container(fields))
            }
            Shape::Value => Err(MapperError::Schema(
                "Scalar values need a Poco or collection layout".to_string(),
            )),
        }
    }
}

fn unsupported(operation: String) -> MapperError {
    MapperError::UnsupportedOperation {
        backend: BACKEND,
        operation,
    }
}

fn encode(value: &Value) -> Result<String, MapperError> {
    Ok(serde_json::to_string(value)?)
}

fn decode_text(text: &str) -> Result<Value, MapperError> {
    serde_json::from_str(text).map_err(|err| BackendError::decode(err.to_string()).into())
}

fn read_command(key: String, layout: &Layout) -> KvCommand {
    match layout {
        Layout::List => KvCommand::ListRange { key },
        Layout::Set => KvCommand::SetMembers { key },
        _ => KvCommand::HashGetAll { key },
    }
}

/// Key/value mapper; the key is every key component joined by the separator
#[derive(Debug)]
pub struct KvMapper<T> {
    layout: Layout,
    settings: KvSettings,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for KvMapper<T> {
    fn clone(&self) -> Self {
        Self {
            layout: self.layout.clone(),
            settings: self.settings.clone(),
            _value: PhantomData,
        }
    }
}

impl<T> KvMapper<T> {
    fn with_layout(layout: Layout) -> Self {
        Self {
            layout,
            settings: KvSettings::default(),
            _value: PhantomData,
        }
    }

    /// Poco stored as one hash of its fields
    pub fn poco() -> Self {
        Self::with_layout(Layout::Hash)
    }

    /// Dictionary stored as one hash keyed by the stringified entry key
    pub fn dictionary() -> Self {
        Self::with_layout(Layout::Hash)
    }

    pub fn list() -> Self {
        Self::with_layout(Layout::List)
    }

    pub fn set() -> Self {
        Self::with_layout(Layout::Set)
    }

    /// Container stored as one key per field, suffixed with the stored field name
    pub fn container(schema: &Schema) -> Result<Self, MapperError> {
        Ok(Self::with_layout(Layout::for_shape(Shape::Container, Some(schema))?))
    }

    pub fn with_settings(mut self, settings: KvSettings) -> Self {
        self.settings = settings;
        self
    }

    fn base_key(&self, keys: &[Key]) -> Result<String, MapperError> {
        check_arity(keys, 1)?;
        Ok(keys
            .iter()
            .map(Key::to_string)
            .collect::<Vec<_>>()
            .join(&self.settings.key_separator))
    }

    fn field_key(&self, base: &str, field: &str) -> String {
        format!("{}{}{}", base, self.settings.key_separator, field)
    }

    fn write_commands(
        &self,
        value: &Value,
        key: String,
        layout: &Layout,
        commands: &mut Vec<KvCommand>,
    ) -> Result<(), MapperError> {
        if let Layout::Container(fields) = layout {
            for (name, stored, field_layout) in fields {
                let field_key = self.field_key(&key, stored);
                match value.get(name) {
                    Some(field) if !field.is_null() => {
                        self.write_commands(field, field_key, field_layout, commands)?
                    }
                    _ => commands.push(KvCommand::Delete { key: field_key }),
                }
            }
            return Ok(());
        }

        commands.push(KvCommand::Delete { key: key.clone() });
        match (layout, value) {
            (Layout::Hash, Value::Object(map)) => {
                let fields = map
                    .iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| Ok((k.clone(), encode(v)?)))
                    .collect::<Result<Vec<_>, MapperError>>()?;
                if !fields.is_empty() {
                    commands.push(KvCommand::HashSet { key, fields });
                }
            }
            (Layout::List, Value::Array(items)) => {
                let values = items.iter().map(encode).collect::<Result<Vec<_>, MapperError>>()?;
                if !values.is_empty() {
                    commands.push(KvCommand::ListPush {
                        key,
                        end: ListEnd::Back,
                        values,
                    });
                }
            }
            (Layout::Set, Value::Array(items)) => {
                let members = items.iter().map(encode).collect::<Result<Vec<_>, MapperError>>()?;
                if !members.is_empty() {
                    commands.push(KvCommand::SetAdd { key, members });
                }
            }
            (layout, value) => {
                return Err(MapperError::Schema(format!(
                    "Cannot store {} with {:?} layout",
                    value, layout
                )))
            }
        }
        Ok(())
    }

    fn save_commands(
        &self,
        change_set: &ChangeSet,
        key: String,
        layout: &Layout,
        commands: &mut Vec<KvCommand>,
    ) -> Result<(), MapperError> {
        match (layout, change_set) {
            (Layout::Hash, ChangeSet::Poco(fields)) => {
                let mut set = Vec::new();
                let mut deleted = Vec::new();
                for (field, change) in fields {
                    if change.new.is_null() {
                        deleted.push(field.clone());
                    } else {
                        set.push((field.clone(), encode(&change.new)?));
                    }
                }
                hash_commands(key, set, deleted, commands);
            }
            (Layout::Hash, ChangeSet::Dictionary(entries)) => {
                let mut set = Vec::new();
                let mut deleted = Vec::new();
                for (entry, change) in entries {
                    let field = key_string(entry);
                    match (change.op, &change.new) {
                        (DictionaryOperation::Remove, _) | (_, None) => deleted.push(field),
                        (_, Some(new)) => set.push((field, encode(new)?)),
                    }
                }
                hash_commands(key, set, deleted, commands);
            }
            (Layout::List, ChangeSet::List(log)) => {
                if let Some(change) = log
                    .iter()
                    .find(|c| matches!(c.op, ListOperation::Insert | ListOperation::Remove))
                {
                    return Err(unsupported(format!(
                        "list {} at index {}",
                        change.op.as_str(),
                        change.index
                    )));
                }
                for change in log {
                    let new = change.new.as_ref().map(encode).transpose()?;
                    let command = match change.op {
                        ListOperation::PushBack | ListOperation::PushFront => {
                            let end = if change.op == ListOperation::PushBack {
                                ListEnd::Back
                            } else {
                                ListEnd::Front
                            };
                            let value = new.unwrap_or_else(|| "null".to_string());
                            if let Some(KvCommand::ListPush {
                                key: last,
                                end: last_end,
                                values,
                            }) = commands.last_mut()
                            {
                                if *last == key && *last_end == end {
                                    values.push(value);
                                    continue;
                                }
                            }
                            KvCommand::ListPush {
                                key: key.clone(),
                                end,
                                values: vec![value],
                            }
                        }
                        ListOperation::PopFront => KvCommand::ListPop {
                            key: key.clone(),
                            end: ListEnd::Front,
                        },
                        ListOperation::PopBack => KvCommand::ListPop {
                            key: key.clone(),
                            end: ListEnd::Back,
                        },
                        _ => KvCommand::ListSet {
                            key: key.clone(),
                            index: change.index,
                            value: new.unwrap_or_else(|| "null".to_string()),
                        },
                    };
                    commands.push(command);
                }
            }
            (Layout::Set, ChangeSet::Set(members)) => {
                let mut added = Vec::new();
                let mut removed = Vec::new();
                for (member, op) in members {
                    match op {
                        SetOperation::Add => added.push(encode(member)?),
                        SetOperation::Remove => removed.push(encode(member)?),
                    }
                }
                if !removed.is_empty() {
                    commands.push(KvCommand::SetRemove {
                        key: key.clone(),
                        members: removed,
                    });
                }
                if !added.is_empty() {
                    commands.push(KvCommand::SetAdd { key, members: added });
                }
            }
            (Layout::Container(fields), ChangeSet::Container(changes)) => {
                for (name, nested) in changes {
                    if nested.is_empty() {
                        continue;
                    }
                    let (_, stored, field_layout) = fields
                        .iter()
                        .find(|(field, _, _)| field == name)
                        .ok_or_else(|| TrackError::UnknownField(name.clone()))?;
                    let field_key = self.field_key(&key, stored);
                    self.save_commands(nested, field_key, field_layout, commands)?;
                }
            }
            (layout, change_set) => {
                return Err(MapperError::Schema(format!(
                    "Cannot save {:?} changes with {:?} layout",
                    change_set.shape(),
                    layout
                )))
            }
        }
        Ok(())
    }

    fn read_commands(&self, base: &str) -> Vec<KvCommand> {
        match &self.layout {
            Layout::Container(fields) => fields
                .iter()
                .map(|(_, stored, layout)| read_command(self.field_key(base, stored), layout))
                .collect(),
            layout => vec![read_command(base.to_string(), layout)],
        }
    }

    fn delete_commands(&self, base: &str) -> Vec<KvCommand> {
        match &self.layout {
            Layout::Container(fields) => fields
                .iter()
                .map(|(_, stored, _)| KvCommand::Delete {
                    key: self.field_key(base, stored),
                })
                .collect(),
            _ => vec![KvCommand::Delete { key: base.to_string() }],
        }
    }

    async fn submit(
        &self,
        session: &dyn KvSession,
        commands: Vec<KvCommand>,
        keys: &[Key],
    ) -> Result<Vec<KvReply>, MapperError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        for command in &commands {
            trace!(?command, "Command");
        }
        debug!(keys = %display_keys(keys), commands = commands.len(), "Executing commands");
        Ok(session.execute(&commands).await?)
    }
}

fn hash_commands(
    key: String,
    set: Vec<(String, String)>,
    deleted: Vec<String>,
    commands: &mut Vec<KvCommand>,
) {
    if !deleted.is_empty() {
        commands.push(KvCommand::HashDelete {
            key: key.clone(),
            fields: deleted,
        });
    }
    if !set.is_empty() {
        commands.push(KvCommand::HashSet { key, fields: set });
    }
}

/// Decode one read reply; empty and missing both come back as `None`
fn decode_reply(reply: KvReply) -> Result<Option<Value>, MapperError> {
    match reply {
        KvReply::Hash(hash) if hash.is_empty() => Ok(None),
        KvReply::Hash(hash) => {
            let mut object = Map::new();
            for (field, text) in hash {
                object.insert(field, decode_text(&text)?);
            }
            Ok(Some(Value::Object(object)))
        }
        KvReply::List(items) if items.is_empty() => Ok(None),
        KvReply::List(items) => Ok(Some(Value::Array(
            items.iter().map(|t| decode_text(t)).collect::<Result<_, _>>()?,
        ))),
        KvReply::Members(members) if members.is_empty() => Ok(None),
        KvReply::Members(members) => Ok(Some(Value::Array(
            members.iter().map(|t| decode_text(t)).collect::<Result<_, _>>()?,
        ))),
        other => Err(BackendError::decode(format!("Unexpected reply {:?}", other)).into()),
    }
}

#[async_trait]
impl<T> Mapper for KvMapper<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    type Session = dyn KvSession;
    type Value = T;

    /// Overwrites whatever the key held
    async fn create(
        &self,
        session: &Self::Session,
        value: &T,
        keys: &[Key],
    ) -> Result<usize, MapperError> {
        let base = self.base_key(keys)?;
        let mut commands = Vec::new();
        self.write_commands(&to_value(value)?, base, &self.layout, &mut commands)?;
        let sent = commands.len();
        self.submit(session, commands, keys).await?;
        Ok(sent)
    }

    async fn load(&self, session: &Self::Session, keys: &[Key]) -> Result<Option<T>, MapperError> {
        let base = self.base_key(keys)?;
        let replies = self.submit(session, self.read_commands(&base), keys).await?;
        let value = match &self.layout {
            Layout::Container(fields) => {
                let mut object = Map::new();
                for ((name, _, _), reply) in fields.iter().zip(replies) {
                    if let Some(value) = decode_reply(reply)? {
                        object.insert(name.clone(), value);
                    }
                }
                (!object.is_empty()).then_some(Value::Object(object))
            }
            _ => match replies.into_iter().next() {
                Some(reply) => decode_reply(reply)?,
                None => None,
            },
        };
        match value {
            Some(value) => Ok(Some(from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        session: &Self::Session,
        changes: &dyn ChangeSource,
        keys: &[Key],
    ) -> Result<usize, MapperError> {
        let base = self.base_key(keys)?;
        if !changes.has_change() {
            return Ok(0);
        }
        let mut commands = Vec::new();
        self.save_commands(&changes.change_set()?, base, &self.layout, &mut commands)?;
        let sent = commands.len();
        self.submit(session, commands, keys).await?;
        Ok(sent)
    }

    async fn delete(&self, session: &Self::Session, keys: &[Key]) -> Result<usize, MapperError> {
        let base = self.base_key(keys)?;
        let replies = self.submit(session, self.delete_commands(&base), keys).await?;
        Ok(replies
            .into_iter()
            .map(|reply| match reply {
                KvReply::Count(n) => n,
                _ => 0,
            })
            .sum())
    }
}
