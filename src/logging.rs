//! Logging System
//!
//! Structured logging through the `tracing` crate. Mappers emit `debug!` events
//! for each backend round trip and `trace!` events with the rendered statements
//! or commands; this module installs a subscriber for applications that want them.

use crate::error::MapperError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable holding a full filter directive, overriding the config
pub const LOG_ENV: &str = "TRACKABLE_LOG";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text (default: text)
    #[serde(default = "default_format")]
    pub format: String,

    /// Enable colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            color: default_true(),
            modules: BTreeMap::new(),
        }
    }
}

/// Initialize the global subscriber, writing to stderr
///
/// A filter in `TRACKABLE_LOG` wins over the configured level and module
/// directives. Fails if a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), MapperError> {
    let filter = build_env_filter(config)?;
    let json = parse_format(&config.format)?;
    let base_subscriber = Registry::default().with(filter);

    let result = if json {
        base_subscriber
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        base_subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(config.color)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.map_err(|e| MapperError::Config(format!("Failed to install subscriber: {}", e)))
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, MapperError> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| MapperError::Config(format!("Invalid log level {}: {}", config.level, e)))?;
    for (module, level) in &config.modules {
        let directive = format!("{}={}", module, level);
        filter = filter.add_directive(
            directive.parse().map_err(|e| {
                MapperError::Config(format!("Invalid log directive {}: {}", directive, e))
            })?,
        );
    }
    Ok(filter)
}

fn parse_format(format: &str) -> Result<bool, MapperError> {
    match format {
        "json" => Ok(true),
        "text" => Ok(false),
        other => Err(MapperError::Config(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            other
        ))),
    }
}
