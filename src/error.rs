//! Error types for change tracking and persistence mapping.

use crate::registry::Shape;
use thiserror::Error;

/// Tracking-related errors
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Invalid transition for {key}: {attempted} after {prior}")]
    InvalidTransition {
        key: String,
        prior: &'static str,
        attempted: &'static str,
    },

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Shape, actual: Shape },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Unknown path: {0}")]
    UnknownPath(String),

    #[error("Trackable has no tracker attached")]
    NotTracked,

    #[error("Value conversion failed: {0}")]
    Conversion(#[from] serde_json::Error),
}

/// Classification of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Transport or storage engine failure
    Io,
    /// Constraint violation (duplicate primary key, NOT NULL, ...)
    Constraint,
    /// Stored data could not be decoded
    Decode,
    /// Command applied to a key holding a different data type
    WrongType,
}

/// Failure reported by a backend session
#[derive(Debug, Error)]
#[error("Backend {kind:?} error: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
    /// Index of the first operation of the batch that was not applied, when known
    pub first_unapplied: Option<usize>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            first_unapplied: None,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Io, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Decode, message)
    }

    /// Attach the index of the first unapplied operation
    pub fn at(mut self, index: usize) -> Self {
        self.first_unapplied = Some(index);
        self
    }
}

/// Mapper-related errors
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("Unsupported operation on {backend}: {operation}")]
    UnsupportedOperation {
        backend: &'static str,
        operation: String,
    },

    #[error("Key path too short: {required} head keys required, {supplied} supplied")]
    KeyArity { required: usize, supplied: usize },

    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    #[error("Type not registered: {0}")]
    Unregistered(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Track(#[from] TrackError),
}

impl From<config::ConfigError> for MapperError {
    fn from(err: config::ConfigError) -> Self {
        MapperError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        MapperError::Track(TrackError::Conversion(err))
    }
}
