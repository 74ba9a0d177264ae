//! Key/Value Store Mapping
//!
//! Flat fields live in one hash per key; list and set fields use the store's
//! native sequence and set types. Values are stored as JSON text. Stores of this
//! kind drop a collection when it becomes empty, so an empty value and a missing
//! key read back the same way: both load as absent.

mod mapper;

pub use mapper::KvMapper;

use crate::error::{BackendError, BackendErrorKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// End of a native list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListEnd {
    Front,
    Back,
}

/// One store command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum KvCommand {
    HashSet { key: String, fields: Vec<(String, String)> },
    HashDelete { key: String, fields: Vec<String> },
    HashGetAll { key: String },
    /// Push each value in turn; at the front this reverses their order
    ListPush { key: String, end: ListEnd, values: Vec<String> },
    ListPop { key: String, end: ListEnd },
    ListSet { key: String, index: usize, value: String },
    ListRange { key: String },
    SetAdd { key: String, members: Vec<String> },
    SetRemove { key: String, members: Vec<String> },
    SetMembers { key: String },
    Delete { key: String },
}

impl KvCommand {
    pub fn key(&self) -> &str {
        match self {
            KvCommand::HashSet { key, .. }
            | KvCommand::HashDelete { key, .. }
            | KvCommand::HashGetAll { key }
            | KvCommand::ListPush { key, .. }
            | KvCommand::ListPop { key, .. }
            | KvCommand::ListSet { key, .. }
            | KvCommand::ListRange { key }
            | KvCommand::SetAdd { key, .. }
            | KvCommand::SetRemove { key, .. }
            | KvCommand::SetMembers { key }
            | KvCommand::Delete { key } => key,
        }
    }

    /// True for commands that never modify the store
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            KvCommand::HashGetAll { .. }
                | KvCommand::ListRange { .. }
                | KvCommand::SetMembers { .. }
        )
    }
}

/// Result of one command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "value", rename_all = "snake_case")]
pub enum KvReply {
    /// Number of fields, elements or keys affected
    Count(usize),
    Popped(Option<String>),
    Hash(BTreeMap<String, String>),
    List(Vec<String>),
    Members(BTreeSet<String>),
}

/// Caller-owned key/value store connection
///
/// Commands of one call are applied sequentially and not atomically. A failure
/// reports the index of the first unapplied command; earlier commands stay
/// applied.
#[async_trait]
pub trait KvSession: Send + Sync {
    async fn execute(&self, commands: &[KvCommand]) -> Result<Vec<KvReply>, BackendError>;
}

#[derive(Debug, Clone)]
enum Entry {
    Hash(BTreeMap<String, String>),
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

impl Entry {
    fn is_empty(&self) -> bool {
        match self {
            Entry::Hash(map) => map.is_empty(),
            Entry::List(items) => items.is_empty(),
            Entry::Set(members) => members.is_empty(),
        }
    }
}

/// In-process [`KvSession`]
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

fn wrong_type(key: &str) -> BackendError {
    BackendError::new(
        BackendErrorKind::WrongType,
        format!("Operation against key {} holding the wrong kind of value", key),
    )
}

macro_rules! entry_of {
    ($entries:expr, $key:expr, $variant:ident, $empty:expr) => {
        match $entries.entry($key.to_string()).or_insert_with(|| Entry::$variant($empty)) {
            Entry::$variant(inner) => inner,
            _ => return Err(wrong_type($key)),
        }
    };
}

macro_rules! existing_of {
    ($entries:expr, $key:expr, $variant:ident) => {
        match $entries.get_mut($key) {
            None => None,
            Some(Entry::$variant(inner)) => Some(inner),
            Some(_) => return Err(wrong_type($key)),
        }
    };
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    fn apply(
        entries: &mut HashMap<String, Entry>,
        command: &KvCommand,
    ) -> Result<KvReply, BackendError> {
        let reply = match command {
            KvCommand::HashSet { key, fields } => {
                let hash = entry_of!(entries, key, Hash, BTreeMap::new());
                for (field, value) in fields {
                    hash.insert(field.clone(), value.clone());
                }
                KvReply::Count(fields.len())
            }
            KvCommand::HashDelete { key, fields } => match existing_of!(entries, key, Hash) {
                None => KvReply::Count(0),
                Some(hash) => {
                    KvReply::Count(fields.iter().filter(|f| hash.remove(*f).is_some()).count())
                }
            },
            KvCommand::HashGetAll { key } => match existing_of!(entries, key, Hash) {
                None => KvReply::Hash(BTreeMap::new()),
                Some(hash) => KvReply::Hash(hash.clone()),
            },
            KvCommand::ListPush { key, end, values } => {
                let list = entry_of!(entries, key, List, VecDeque::new());
                for value in values {
                    match end {
                        ListEnd::Front => list.push_front(value.clone()),
                        ListEnd::Back => list.push_back(value.clone()),
                    }
                }
                KvReply::Count(list.len())
            }
            KvCommand::ListPop { key, end } => match existing_of!(entries, key, List) {
                None => KvReply::Popped(None),
                Some(list) => KvReply::Popped(match end {
                    ListEnd::Front => list.pop_front(),
                    ListEnd::Back => list.pop_back(),
                }),
            },
            KvCommand::ListSet { key, index, value } => {
                let list = existing_of!(entries, key, List).ok_or_else(|| {
                    BackendError::new(
                        BackendErrorKind::WrongType,
                        format!("No list at key {}", key),
                    )
                })?;
                let len = list.len();
                let slot = list.get_mut(*index).ok_or_else(|| {
                    BackendError::new(
                        BackendErrorKind::WrongType,
                        format!("Index {} out of range for list {} of length {}", index, key, len),
                    )
                })?;
                *slot = value.clone();
                KvReply::Count(1)
            }
            KvCommand::ListRange { key } => match existing_of!(entries, key, List) {
                None => KvReply::List(Vec::new()),
                Some(list) => KvReply::List(list.iter().cloned().collect()),
            },
            KvCommand::SetAdd { key, members } => {
                let set = entry_of!(entries, key, Set, BTreeSet::new());
                KvReply::Count(members.iter().filter(|m| set.insert((*m).clone())).count())
            }
            KvCommand::SetRemove { key, members } => match existing_of!(entries, key, Set) {
                None => KvReply::Count(0),
                Some(set) => KvReply::Count(members.iter().filter(|m| set.remove(*m)).count()),
            },
            KvCommand::SetMembers { key } => match existing_of!(entries, key, Set) {
                None => KvReply::Members(BTreeSet::new()),
                Some(set) => KvReply::Members(set.clone()),
            },
            KvCommand::Delete { key } => KvReply::Count(usize::from(entries.remove(key).is_some())),
        };

        let key = command.key();
        if entries.get(key).is_some_and(Entry::is_empty) {
            entries.remove(key);
        }
        Ok(reply)
    }
}

#[async_trait]
impl KvSession for MemoryKvStore {
    async fn execute(&self, commands: &[KvCommand]) -> Result<Vec<KvReply>, BackendError> {
        let mut entries = self.entries.lock();
        let mut replies = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            replies.push(Self::apply(&mut entries, command).map_err(|err| err.at(index))?);
        }
        Ok(replies)
    }
}
