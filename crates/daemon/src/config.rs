//! Configuration management for the LanShare daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/lanshare/config.toml`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bind_address/port do not form a valid socket address: {0}")]
    InvalidBindAddress(String),

    #[error("max_depth must be between 1 and 32, got {0}")]
    InvalidMaxDepth(usize),

    #[error("queue_capacity must be at least 1, got {0}")]
    InvalidQueueCapacity(usize),

    #[error("keep_alive_secs must be between 1 and 600, got {0}")]
    InvalidKeepAlive(u64),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the LanShare daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// HTTP listener configuration.
    pub server: ServerConfig,

    /// Shared-directory configuration.
    pub share: ShareConfig,

    /// Change-notification configuration.
    pub events: EventsConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener to.
    pub bind_address: String,

    /// TCP port. Port 0 binds an ephemeral port (used by tests).
    pub port: u16,
}

/// Shared-directory configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShareConfig {
    /// The directory tree exposed to clients. Created at startup if absent.
    pub root_dir: PathBuf,

    /// Maximum folder nesting depth below the root.
    pub max_depth: usize,
}

/// Change-notification configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Pending events buffered per subscriber before it is dropped as
    /// unresponsive.
    pub queue_capacity: usize,

    /// Idle seconds between keep-alive comments on an event stream.
    pub keep_alive_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            root_dir: default_share_dir(),
            max_depth: 5,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            keep_alive_secs: 30,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lanshare")
        .join("config.toml")
}

/// Returns the default shared-directory path.
fn default_share_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lanshare")
        .join("shared")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - LANSHARE_BIND_ADDRESS: Override the listener address
    /// - LANSHARE_PORT: Override the listener port
    /// - LANSHARE_ROOT_DIR: Override the shared directory
    /// - LANSHARE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("LANSHARE_BIND_ADDRESS") {
            if !addr.is_empty() {
                tracing::info!("Overriding bind_address from environment: {}", addr);
                self.server.bind_address = addr;
            }
        }

        if let Ok(port) = std::env::var("LANSHARE_PORT") {
            if let Ok(port) = port.parse() {
                tracing::info!("Overriding port from environment: {}", port);
                self.server.port = port;
            }
        }

        if let Ok(dir) = std::env::var("LANSHARE_ROOT_DIR") {
            if !dir.is_empty() {
                tracing::info!("Overriding root_dir from environment: {}", dir);
                self.share.root_dir = PathBuf::from(dir);
            }
        }

        if let Ok(level) = std::env::var("LANSHARE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;

        if self.share.max_depth < 1 || self.share.max_depth > 32 {
            return Err(ConfigError::InvalidMaxDepth(self.share.max_depth));
        }

        if self.events.queue_capacity < 1 {
            return Err(ConfigError::InvalidQueueCapacity(
                self.events.queue_capacity,
            ));
        }

        if self.events.keep_alive_secs < 1 || self.events.keep_alive_secs > 600 {
            return Err(ConfigError::InvalidKeepAlive(self.events.keep_alive_secs));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// The socket address the listener binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.bind_address, self.server.port)
            .parse()
            .map_err(|_| {
                ConfigError::InvalidBindAddress(format!(
                    "{}:{}",
                    self.server.bind_address, self.server.port
                ))
            })
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/lanshare/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
