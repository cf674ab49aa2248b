//! Tabstore Runtime - hosts the state engine inside one dashboard tab.
//!
//! The engine crate knows nothing about storage, tabs or time. This crate
//! supplies them: a [`StateManager`] registry per tab, storage backends that
//! are private to a tab or shared between tabs, default stores, and the
//! [`lifecycle::run`] loop that persists periodically, reloads on focus,
//! flushes on unload and applies other tabs' changes.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tabstore_runtime::{Config, StateManager, StorageArea, TabPersistentStorage};
//!
//! let area = StorageArea::new_shared();
//! let (storage, _changes) = TabPersistentStorage::attach(Arc::clone(&area));
//! let manager = StateManager::new(Config::default(), Box::new(storage));
//! manager.init().unwrap();
//!
//! let prefs = manager.get_store("preferences").unwrap();
//! prefs.set("theme", serde_json::json!("dark")).unwrap();
//! manager.persist_state().unwrap();
//! ```

pub mod clock;
pub mod config;
pub mod defaults;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod storage;

pub use config::{Config, ConfigError, StorageKind};
pub use error::{Result, RuntimeError, StorageError};
pub use lifecycle::{TabEvent, TabEventReceiver, TabEventSender};
pub use manager::{StateManager, StoreOverrides};
pub use storage::{
    StorageArea, StorageBackend, StorageChange, TabLocalStorage, TabPersistentStorage,
};

use std::sync::Arc;

/// Build the backend selected by `config`.
///
/// `tab-persistent` attaches to `area` when given, otherwise to a new area
/// (file-backed if `config.storage_file` is set). The change feed is only
/// returned for `tab-persistent`.
pub fn open_storage(
    config: &Config,
    area: Option<Arc<StorageArea>>,
) -> Result<(Box<dyn StorageBackend>, Option<storage::ChangeReceiver>)> {
    match config.storage_backend {
        StorageKind::TabLocal => {
            let storage: Box<dyn StorageBackend> =
                Box::new(TabLocalStorage::new().with_quota(config.storage_quota_bytes));
            Ok((storage, None))
        }
        StorageKind::TabPersistent => {
            let area = match area {
                Some(area) => area,
                None => {
                    let area = match &config.storage_file {
                        Some(path) => StorageArea::open(path)?,
                        None => StorageArea::new(),
                    };
                    Arc::new(area.with_quota(config.storage_quota_bytes))
                }
            };
            let (storage, changes) = TabPersistentStorage::attach(area);
            let storage: Box<dyn StorageBackend> = Box::new(storage);
            Ok((storage, Some(changes)))
        }
    }
}
