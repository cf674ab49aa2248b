//! The store registry of one tab.
//!
//! [`StateManager`] owns every named store, the event bus they share, and
//! the storage backend they persist into. It is constructed once per tab
//! and passed by reference to whatever needs a store.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;
use tabstore_engine::{Clock, EventBus, PersistedState, Store, StoreName, StoreOptions};

use crate::clock::system_clock;
use crate::config::{Config, StorageKind};
use crate::defaults;
use crate::error::{Result, RuntimeError, StorageError};
use crate::storage::{StorageBackend, StorageChange};

/// Per-store options that replace the registry defaults when set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOverrides {
    pub persist: Option<bool>,
    pub sync: Option<bool>,
    pub max_history_size: Option<usize>,
    pub validation_enabled: Option<bool>,
}

impl StoreOverrides {
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn max_history_size(mut self, size: usize) -> Self {
        self.max_history_size = Some(size);
        self
    }

    pub fn validation_enabled(mut self, enabled: bool) -> Self {
        self.validation_enabled = Some(enabled);
        self
    }

    /// Merge over `base`.
    pub fn apply(self, base: StoreOptions) -> StoreOptions {
        StoreOptions {
            persist: self.persist.unwrap_or(base.persist),
            sync: self.sync.unwrap_or(base.sync),
            max_history_size: self.max_history_size.unwrap_or(base.max_history_size),
            validation_enabled: self.validation_enabled.unwrap_or(base.validation_enabled),
        }
    }
}

/// Registry of named stores for one tab.
pub struct StateManager {
    config: Arc<Config>,
    storage: Box<dyn StorageBackend>,
    bus: EventBus,
    clock: Rc<dyn Clock>,
    stores: RefCell<BTreeMap<StoreName, Store>>,
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("persistence_key", &self.config.persistence_key)
            .field("storage", &self.storage.kind())
            .field("stores", &self.store_names())
            .finish()
    }
}

impl StateManager {
    /// Create an empty registry using the system clock.
    pub fn new(config: impl Into<Arc<Config>>, storage: Box<dyn StorageBackend>) -> Self {
        Self::with_clock(config, storage, system_clock())
    }

    /// Create an empty registry with an explicit clock.
    pub fn with_clock(
        config: impl Into<Arc<Config>>,
        storage: Box<dyn StorageBackend>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            config: config.into(),
            storage,
            bus: EventBus::new(),
            clock,
            stores: RefCell::new(BTreeMap::new()),
        }
    }

    /// Register the default stores and load persisted state.
    ///
    /// A failure to load is logged, not returned: the tab starts from the
    /// defaults instead.
    pub fn init(&self) -> Result<()> {
        defaults::register(self)?;

        match self.load_persisted_state() {
            Ok(restored) => tracing::info!(
                stores = restored,
                backend = %self.storage.kind(),
                key = %self.config.persistence_key,
                "State manager initialized"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to load persisted state, starting from defaults"),
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage.kind()
    }

    /// Create and register a store. `overrides` replace the defaults derived
    /// from the configuration.
    pub fn create_store(
        &self,
        name: impl Into<StoreName>,
        initial: Value,
        overrides: StoreOverrides,
    ) -> Result<Store> {
        let name = name.into();
        if self.stores.borrow().contains_key(&name) {
            return Err(RuntimeError::DuplicateStore(name));
        }

        let options = overrides.apply(self.config.store_defaults());
        let store = Store::new(
            name.clone(),
            initial,
            options,
            self.bus.clone(),
            Rc::clone(&self.clock),
        )?;
        self.stores.borrow_mut().insert(name.clone(), store.clone());

        tracing::debug!(store = %name, ?options, "Store created");
        Ok(store)
    }

    pub fn get_store(&self, name: &str) -> Option<Store> {
        self.stores.borrow().get(name).cloned()
    }

    /// Names of all registered stores, sorted.
    pub fn store_names(&self) -> Vec<StoreName> {
        self.stores.borrow().keys().cloned().collect()
    }

    /// Unregister a store. Handles held elsewhere keep working but the store
    /// is no longer persisted or synchronized.
    pub fn remove_store(&self, name: &str) -> bool {
        let removed = self.stores.borrow_mut().remove(name).is_some();
        if removed {
            tracing::debug!(store = %name, "Store removed");
        }
        removed
    }

    /// Stores at call time. Iterating the copy lets callbacks triggered by
    /// hydration create or remove stores.
    fn registered(&self) -> Vec<(StoreName, Store)> {
        self.stores
            .borrow()
            .iter()
            .map(|(name, store)| (name.clone(), store.clone()))
            .collect()
    }

    /// Write every persistable store to storage under the persistence key.
    ///
    /// Returns the number of stores written.
    pub fn persist_state(&self) -> Result<usize> {
        let persisted: PersistedState = self
            .registered()
            .into_iter()
            .filter(|(_, store)| store.options().persist)
            .map(|(name, store)| (name, store.serialize()))
            .collect();

        let json = persisted.to_json()?;
        self.storage.set_item(&self.config.persistence_key, &json)?;

        tracing::debug!(
            stores = persisted.len(),
            bytes = json.len(),
            key = %self.config.persistence_key,
            "State persisted"
        );
        Ok(persisted.len())
    }

    /// Hydrate registered stores from storage. Stores missing from the
    /// payload keep their state; unknown names in it are ignored.
    ///
    /// Returns the number of stores hydrated.
    pub fn load_persisted_state(&self) -> Result<usize> {
        let Some(raw) = self.storage.get_item(&self.config.persistence_key)? else {
            return Ok(0);
        };
        let persisted = PersistedState::from_json(&raw)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let mut restored = 0;
        for (name, store) in self.registered() {
            let Some(snapshot) = persisted.get(&name) else {
                continue;
            };
            match store.hydrate(snapshot) {
                Ok(()) => restored += 1,
                Err(e) => tracing::warn!(store = %name, error = %e, "Skipping unusable persisted state"),
            }
        }
        Ok(restored)
    }

    /// Apply state written by another tab.
    ///
    /// Only changes to the persistence key are considered; cleared keys and
    /// disabled sync are ignored. Each sync-enabled store present in the
    /// payload is synchronized (last writer wins). Returns the number of
    /// stores that changed.
    pub fn apply_storage_change(&self, change: &StorageChange) -> Result<usize> {
        if change.key != self.config.persistence_key {
            return Ok(0);
        }
        if !self.config.sync_enabled {
            tracing::debug!(key = %change.key, "Sync disabled, ignoring storage change");
            return Ok(0);
        }
        let Some(raw) = change.new_value.as_deref() else {
            tracing::debug!(key = %change.key, "Persistence key cleared by another tab");
            return Ok(0);
        };
        let persisted =
            PersistedState::from_json(raw).map_err(|e| RuntimeError::SyncParse(e.to_string()))?;

        let mut applied = 0;
        for (name, store) in self.registered() {
            if !store.options().sync {
                continue;
            }
            let Some(snapshot) = persisted.get(&name) else {
                continue;
            };
            match store.synchronize(snapshot) {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(store = %name, error = %e, "Rejected synchronized state"),
            }
        }
        Ok(applied)
    }

    /// Periodic persistence tick.
    pub fn on_interval(&self) {
        if let Err(e) = self.persist_state() {
            tracing::warn!(error = %e, "Periodic persist failed");
        }
    }

    /// The tab regained focus: reload what other tabs may have written.
    pub fn on_focus(&self) {
        match self.load_persisted_state() {
            Ok(restored) => tracing::debug!(stores = restored, "Reloaded state on focus"),
            Err(e) => tracing::warn!(error = %e, "Reload on focus failed"),
        }
    }

    /// The tab is closing: flush everything.
    pub fn on_unload(&self) {
        match self.persist_state() {
            Ok(stores) => tracing::info!(stores, "State flushed on unload"),
            Err(e) => tracing::warn!(error = %e, "Flush on unload failed"),
        }
    }

    /// Another tab wrote to shared storage.
    pub fn on_storage_change(&self, change: &StorageChange) {
        match self.apply_storage_change(change) {
            Ok(0) => {}
            Ok(applied) => tracing::debug!(stores = applied, "Applied state from another tab"),
            Err(e) => tracing::warn!(error = %e, key = %change.key, "Dropping storage change"),
        }
    }
}
