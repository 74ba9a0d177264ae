//! Configuration System
//!
//! Backend settings and logging configuration. Sources are layered through the
//! `config` crate: built-in defaults, then an optional TOML file, then
//! `TRACKABLE_` prefixed environment variables (`__` separates nested keys, e.g.
//! `TRACKABLE_SQL__MAX_BATCH_ROWS=500`).

use crate::error::MapperError;
use crate::logging::LoggingConfig;
use ::config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Rows per multi-row INSERT unless configured otherwise
pub const DEFAULT_MAX_BATCH_ROWS: usize = 1000;

const ENV_PREFIX: &str = "TRACKABLE";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub sql: SqlSettings,

    #[serde(default)]
    pub document: DocumentSettings,

    #[serde(default)]
    pub kv: KvSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relational backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlSettings {
    /// Cap on the rows of one multi-row INSERT
    #[serde(default = "default_max_batch_rows")]
    pub max_batch_rows: usize,
}

fn default_max_batch_rows() -> usize {
    DEFAULT_MAX_BATCH_ROWS
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self {
            max_batch_rows: default_max_batch_rows(),
        }
    }
}

/// Document backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSettings {
    /// Field holding the document id in a stored document
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Separator between segments of a nested field path
    #[serde(default = "default_path_separator")]
    pub path_separator: String,
}

fn default_id_field() -> String {
    "_id".to_string()
}

fn default_path_separator() -> String {
    ".".to_string()
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            id_field: default_id_field(),
            path_separator: default_path_separator(),
        }
    }
}

/// Key/value backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KvSettings {
    /// Separator between key components
    #[serde(default = "default_key_separator")]
    pub key_separator: String,
}

fn default_key_separator() -> String {
    ":".to_string()
}

impl Default for KvSettings {
    fn default() -> Self {
        Self {
            key_separator: default_key_separator(),
        }
    }
}

impl StoreConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), MapperError> {
        if self.sql.max_batch_rows == 0 {
            return Err(MapperError::Config("sql.max_batch_rows must be at least 1".to_string()));
        }
        if self.document.id_field.is_empty() {
            return Err(MapperError::Config("document.id_field cannot be empty".to_string()));
        }
        if self.document.path_separator.is_empty() {
            return Err(MapperError::Config("document.path_separator cannot be empty".to_string()));
        }
        if self.kv.key_separator.is_empty() {
            return Err(MapperError::Config("kv.key_separator cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Layered configuration loading
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from defaults, the optional TOML file at `path`, then the environment
    pub fn load(path: Option<&Path>) -> Result<StoreConfig, MapperError> {
        let mut builder = builder_with_defaults()?;
        if let Some(path) = path {
            debug!(config_path = %path.display(), "Adding configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize::<StoreConfig>()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML string layered over the defaults, without the environment
    pub fn from_toml(text: &str) -> Result<StoreConfig, MapperError> {
        let config = builder_with_defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize::<StoreConfig>()?;
        config.validate()?;
        Ok(config)
    }
}

fn builder_with_defaults() -> Result<ConfigBuilder<::config::builder::DefaultState>, MapperError> {
    let defaults = StoreConfig::default();
    Ok(Config::builder()
        .set_default("sql.max_batch_rows", defaults.sql.max_batch_rows as u64)?
        .set_default("document.id_field", defaults.document.id_field)?
        .set_default("document.path_separator", defaults.document.path_separator)?
        .set_default("kv.key_separator", defaults.kv.key_separator)?
        .set_default("logging.level", defaults.logging.level)?
        .set_default("logging.format", defaults.logging.format)?
        .set_default("logging.color", defaults.logging.color)?)
}
