//! Snapshot types for persisting and synchronizing store state.
//!
//! A [`StoreSnapshot`] is one store's state at a point in time. A
//! [`PersistedState`] aggregates the snapshots of every persistable store
//! under one storage key:
//!
//! ```json
//! {"cart": {"state": {"items": [], "total": 0}, "timestamp": 1706745600000}}
//! ```

use crate::{error::Result, Error, StoreName, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One store's state captured at `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub state: Value,
    /// Capture time in milliseconds since epoch; the last-writer-wins key
    pub timestamp: Timestamp,
}

impl StoreSnapshot {
    pub fn new(state: Value, timestamp: Timestamp) -> Self {
        Self { state, timestamp }
    }

    /// Check that the state is usable as a store root.
    pub fn validate(&self) -> Result<()> {
        if self.state.is_object() {
            Ok(())
        } else {
            Err(Error::InvalidSnapshot(format!(
                "state must be an object, got {}",
                crate::path::kind_name(&self.state)
            )))
        }
    }
}

/// Snapshots of several stores keyed by store name.
///
/// Uses BTreeMap for deterministic serialization order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedState {
    stores: BTreeMap<StoreName, StoreSnapshot>,
}

impl PersistedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<StoreName>, snapshot: StoreSnapshot) {
        self.stores.insert(name.into(), snapshot);
    }

    pub fn get(&self, name: &str) -> Option<&StoreSnapshot> {
        self.stores.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StoreName, &StoreSnapshot)> {
        self.stores.iter()
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Most recent capture time across all stores.
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.stores.values().map(|s| s.timestamp).max()
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }
}

impl FromIterator<(StoreName, StoreSnapshot)> for PersistedState {
    fn from_iter<I: IntoIterator<Item = (StoreName, StoreSnapshot)>>(iter: I) -> Self {
        Self {
            stores: iter.into_iter().collect(),
        }
    }
}
