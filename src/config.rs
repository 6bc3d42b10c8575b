//! Startup configuration loading from file and environment variables.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::acl::{AccessPolicy, AclError};
use crate::microsvc::DEFAULT_EVENT_QUEUE_CAPACITY;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Listener and queue settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Access control list: consumer name to allowed method patterns.
    #[serde(default)]
    pub acl: HashMap<String, Vec<String>>,
}

/// Listener and queue settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on, e.g. `127.0.0.1:8082`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Capacity of the internal event queue.
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "event_relay=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8082".to_string()
}

fn default_event_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// The access policy described by `acl`.
    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::from_map(self.acl.clone())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// `RELAY_ACL` is not a valid ACL.
    #[error("invalid RELAY_ACL: {0}")]
    Acl(#[from] AclError),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `RELAY_LISTEN_ADDR` overrides `server.listen_addr`
/// - `RELAY_EVENT_QUEUE_CAPACITY` overrides `server.event_queue_capacity`
/// - `RELAY_ACL` replaces `acl` with a JSON object (`{"consumer": ["/relay.Biz/*"]}`)
/// - `RELAY_LOG_LEVEL` overrides `logging.level`
/// - `RELAY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if `RELAY_ACL` is malformed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(config, |key| std::env::var(key).ok())
}

fn apply_overrides(
    mut config: Config,
    var: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    if let Some(addr) = var("RELAY_LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Some(capacity) = var("RELAY_EVENT_QUEUE_CAPACITY") {
        if let Ok(parsed) = capacity.parse() {
            config.server.event_queue_capacity = parsed;
        }
    }
    if let Some(acl) = var("RELAY_ACL") {
        config.acl = serde_json::from_str(&acl).map_err(AclError::from)?;
    }
    if let Some(level) = var("RELAY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("RELAY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    Ok(config)
}
