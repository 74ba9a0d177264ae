//! Persistence Mapping
//!
//! The backend-agnostic protocol that turns a tracker's changeset into minimal
//! backend writes and rebuilds trackables from backend reads. Concretizations
//! live in [`sql`], [`document`] and [`kv`].
//!
//! A key path starts with the aggregate root key; further components address a
//! nested field, entry or index inside it. Validation (key arity, unsupported
//! operations) always happens before the first session call.

pub mod document;
pub mod kv;
pub mod sql;

use crate::error::MapperError;
use crate::trackable::Trackable;
use crate::tracker::ChangeSource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// One component of a key path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl Key {
    /// Dynamic form used when rendering a key into a backend value
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(i) => Value::from(*i),
            Key::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{}", i),
            Key::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value.into())
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Int(value.into())
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

/// Build a key path from heterogeneous components
///
/// ```
/// use trackable::keys;
/// let path = keys![1, "items", 3];
/// assert_eq!(path.len(), 3);
/// ```
#[macro_export]
macro_rules! keys {
    ($($key:expr),* $(,)?) => {
        vec![$($crate::mapper::Key::from($key)),*]
    };
}

/// Reject a key path shorter than `required` components
pub fn check_arity(keys: &[Key], required: usize) -> Result<(), MapperError> {
    if keys.len() < required {
        return Err(MapperError::KeyArity {
            required,
            supplied: keys.len(),
        });
    }
    Ok(())
}

/// Render a key path for log output
pub fn display_keys(keys: &[Key]) -> String {
    keys.iter()
        .map(Key::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// Generic persistence protocol, uniform across backends
///
/// Sessions are caller-owned; a mapper never opens, pools or commits them beyond
/// the one batch it submits per call.
#[async_trait]
pub trait Mapper: Send + Sync {
    /// Backend handle injected by the caller
    type Session: ?Sized + Send + Sync;

    /// Value type persisted at the root of the key path
    type Value: Send + Sync;

    /// Persist the full value at the given address
    async fn create(
        &self,
        session: &Self::Session,
        value: &Self::Value,
        keys: &[Key],
    ) -> Result<usize, MapperError>;

    /// Load the value at the given address, `None` when absent
    async fn load(
        &self,
        session: &Self::Session,
        keys: &[Key],
    ) -> Result<Option<Self::Value>, MapperError>;

    /// Write the changes of `changes` only; no change means no session call
    async fn save(
        &self,
        session: &Self::Session,
        changes: &dyn ChangeSource,
        keys: &[Key],
    ) -> Result<usize, MapperError>;

    async fn delete(&self, session: &Self::Session, keys: &[Key]) -> Result<usize, MapperError>;
}

/// Save a trackable's own changes and clear its tracker once the backend confirms
///
/// On failure the changes stay recorded so the save can be retried.
pub async fn save_and_clear<M, V>(
    mapper: &M,
    session: &M::Session,
    value: &mut V,
    keys: &[Key],
) -> Result<usize, MapperError>
where
    M: Mapper,
    V: Trackable + ?Sized,
{
    let Some(change_set) = value.change_set()? else {
        return Ok(0);
    };
    let written = mapper.save(session, &change_set, keys).await?;
    value.clear_changes();
    debug!(keys = %display_keys(keys), written, "Saved and cleared changes");
    Ok(written)
}
