//! Configuration loading and typed config structures for the RangerLink client.
//!
//! The configuration lives in `rangerlink.yaml`. Every section and field has
//! a default, so an empty file is a valid configuration that connects to a
//! local server and saves snapshots under `saves/`.
//!
//! Secrets are not meant to live in the file: `RANGERLINK_PASSWORD` and
//! `DRAGONFLY_URL` override the password and store URL at load time.

use std::path::Path;

use rangerlink_reconcile::error::validate_layout;
use rangerlink_reconcile::{ReconcileError, TrapSettings};
use rangerlink_store::{StorageKey, StoreSettings};
use rangerlink_types::InventoryLayout;
use serde::Deserialize;

use crate::session::LoginRequest;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A parsed value is out of range.
    #[error("invalid config: {source}")]
    Invalid {
        /// What failed validation.
        #[from]
        source: ReconcileError,
    },

    /// The connection section is unusable.
    #[error("invalid connection config: {reason}")]
    Connection {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level client configuration, mirroring `rangerlink.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Which server and slot to join.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Tick loop timing.
    #[serde(default)]
    pub tick: TickConfig,

    /// Host inventory layout.
    #[serde(default)]
    pub inventory: InventoryLayout,

    /// Trap effect tuning.
    #[serde(default)]
    pub traps: TrapSettings,

    /// Snapshot backend.
    #[serde(default)]
    pub store: StoreSettings,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    /// Server hostname.
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Game name announced at login.
    #[serde(default = "default_game")]
    pub game: String,
    /// Slot (player) name.
    #[serde(default)]
    pub slot_name: String,
    /// Room password.
    #[serde(default)]
    pub password: Option<String>,
    /// How long a login may take before it counts as failed.
    #[serde(default = "default_login_timeout_ms")]
    pub login_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            game: default_game(),
            slot_name: String::new(),
            password: None,
            login_timeout_ms: default_login_timeout_ms(),
        }
    }
}

impl ConnectionConfig {
    /// The storage key for this connection's snapshot.
    pub fn storage_key(&self) -> StorageKey {
        StorageKey::new(
            self.host.clone(),
            self.port,
            self.game.clone(),
            self.slot_name.clone(),
        )
    }

    /// The login request for this connection.
    pub fn login_request(&self) -> LoginRequest {
        LoginRequest {
            host: self.host.clone(),
            port: self.port,
            game: self.game.clone(),
            slot_name: self.slot_name.clone(),
            password: self.password.clone(),
            tags: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_owned()
}

const fn default_port() -> u16 {
    38_281
}

fn default_game() -> String {
    "Ranger".to_owned()
}

const fn default_login_timeout_ms() -> u64 {
    10_000
}

/// Tick loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TickConfig {
    /// Milliseconds between ticks. One host frame at 60 fps by default.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Stop after this many ticks (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,
    /// Seed for trap and book-cost randomness. Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_ticks: 0,
            seed: None,
        }
    }
}

const fn default_interval_ms() -> u64 {
    16
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_owned()
}

impl ClientConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    /// and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or a
    /// validation error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Apply `RANGERLINK_PASSWORD` and `DRAGONFLY_URL` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RANGERLINK_PASSWORD") {
            self.connection.password = Some(val);
        }
        if let Ok(val) = std::env::var("DRAGONFLY_URL") {
            self.store = StoreSettings::Dragonfly { url: val };
        }
    }

    /// Check every section for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a bad layout or trap range and
    /// [`ConfigError::Connection`] for an unusable connection section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_layout(&self.inventory)?;
        self.traps.validate()?;
        if self.connection.host.is_empty() {
            return Err(ConfigError::Connection {
                reason: "host is empty".to_owned(),
            });
        }
        if self.tick.interval_ms == 0 {
            return Err(ConfigError::Connection {
                reason: "tick interval must be at least 1 ms".to_owned(),
            });
        }
        Ok(())
    }
}
