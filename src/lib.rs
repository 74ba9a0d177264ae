//! Trackable: Change-Tracked Values with Minimal-Delta Persistence
//!
//! Mutable data holders (records, containers, dictionaries, lists and sets)
//! record every mutation in an attached tracker. Trackers expose their pending
//! changes as a backend-neutral [`ChangeSet`], which mappers translate into the
//! smallest set of writes for a relational, document or key/value store.

pub mod change;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod registry;
pub mod trackable;
pub mod tracker;
pub mod tree;

pub use serde_json::Value;

pub use change::{
    ChangeSet, DictionaryChange, DictionaryOperation, FieldChange, ListChange, ListOperation,
    SetOperation,
};
pub use error::{BackendError, BackendErrorKind, MapperError, TrackError};
pub use mapper::{save_and_clear, Key, Mapper};
pub use registry::{FieldOptions, FieldSpec, Schema, Shape, ShapeRegistry, ValueKind};
pub use trackable::{
    Container, Element, MapKey, Poco, Trackable, TrackableDictionary, TrackableList, TrackableSet,
    Tracked,
};
pub use tracker::{
    ChangeSource, ContainerTracker, DictionaryTracker, ListTracker, PocoTracker, SetTracker,
    Tracker,
};
