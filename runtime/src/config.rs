//! Configuration management for a tab.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabstore_engine::{StoreOptions, DEFAULT_MAX_HISTORY};

/// Which storage a tab persists into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// Private to the tab, gone when the tab closes, no cross-tab events
    TabLocal,
    /// Shared by every tab, survives restarts when file-backed
    TabPersistent,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::TabLocal => f.write_str("tab-local"),
            StorageKind::TabPersistent => f.write_str("tab-persistent"),
        }
    }
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tab-local" | "session" => Ok(StorageKind::TabLocal),
            "tab-persistent" | "local" => Ok(StorageKind::TabPersistent),
            other => Err(ConfigError::InvalidBackend(other.to_string())),
        }
    }
}

/// Tab configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Storage key holding the aggregate of all persisted stores
    pub persistence_key: String,
    pub storage_backend: StorageKind,
    /// Accept state written by other tabs
    pub sync_enabled: bool,
    /// History capacity for stores that do not override it
    pub max_history_size: usize,
    pub validation_enabled: bool,
    /// Period of the background persist tick
    #[serde(skip)]
    pub persist_interval: Duration,
    /// JSON file backing the shared storage area
    #[serde(skip)]
    pub storage_file: Option<PathBuf>,
    /// Upper bound on stored bytes (keys plus values)
    #[serde(skip)]
    pub storage_quota_bytes: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            persistence_key: "app_state".to_string(),
            storage_backend: StorageKind::TabPersistent,
            sync_enabled: true,
            max_history_size: DEFAULT_MAX_HISTORY,
            validation_enabled: true,
            persist_interval: Duration::from_secs(30),
            storage_file: None,
            storage_quota_bytes: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let persistence_key = lookup("STATE_PERSISTENCE_KEY")
            .filter(|key| !key.trim().is_empty())
            .unwrap_or(defaults.persistence_key);

        let storage_backend = match lookup("STATE_STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.storage_backend,
        };

        let sync_enabled = parse_bool(&lookup, "STATE_SYNC_ENABLED", defaults.sync_enabled)?;
        let validation_enabled = parse_bool(
            &lookup,
            "STATE_VALIDATION_ENABLED",
            defaults.validation_enabled,
        )?;

        let max_history_size =
            parse_number(&lookup, "STATE_MAX_HISTORY")?.unwrap_or(defaults.max_history_size);
        if max_history_size == 0 {
            return Err(ConfigError::InvalidHistorySize);
        }

        let persist_interval = match parse_number::<u64>(&lookup, "STATE_PERSIST_INTERVAL_SECS")? {
            Some(0) => return Err(ConfigError::InvalidInterval),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.persist_interval,
        };

        let storage_file = lookup("STATE_STORAGE_FILE")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        let storage_quota_bytes = parse_number(&lookup, "STATE_STORAGE_QUOTA_BYTES")?;

        Ok(Self {
            persistence_key,
            storage_backend,
            sync_enabled,
            max_history_size,
            validation_enabled,
            persist_interval,
            storage_file,
            storage_quota_bytes,
        })
    }

    /// Options applied to stores created without overrides.
    pub fn store_defaults(&self) -> StoreOptions {
        StoreOptions {
            persist: true,
            sync: self.sync_enabled,
            max_history_size: self.max_history_size,
            validation_enabled: self.validation_enabled,
        }
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value: raw }),
    }
}

fn parse_number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { var, value: raw })
        })
        .transpose()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid STATE_STORAGE_BACKEND '{0}', expected tab-local or tab-persistent")]
    InvalidBackend(String),

    #[error("Invalid boolean for {var}: '{value}'")]
    InvalidBool { var: &'static str, value: String },

    #[error("Invalid number for {var}: '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("STATE_MAX_HISTORY must be at least 1")]
    InvalidHistorySize,

    #[error("STATE_PERSIST_INTERVAL_SECS must be at least 1")]
    InvalidInterval,
}
