//! Unified error handling for the runtime.

use crate::config::ConfigError;

/// Failures of a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Corrupt storage contents: {0}")]
    Corrupt(String),
}

/// Runtime error type.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Malformed sync payload: {0}")]
    SyncParse(String),

    #[error("Engine error: {0}")]
    Engine(#[from] tabstore_engine::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store '{0}' already exists")]
    DuplicateStore(String),
}

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
